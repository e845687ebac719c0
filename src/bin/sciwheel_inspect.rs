use anyhow::{bail, Result};
use clap::Parser;

use refwatch::sciwheel::{SciwheelClient, SourceService};

/// Dump a project's items (and optionally notes) for diagnosing a stuck
/// route without touching any webhook.
#[derive(Parser, Debug)]
struct Args {
    /// Project ID to inspect
    #[arg(long)]
    project_id: String,

    /// Reference-library API key (falls back to SCIWHEEL_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Also fetch and print each item's notes
    #[arg(long)]
    notes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let Some(api_key) = args
        .api_key
        .or_else(|| std::env::var("SCIWHEEL_API_KEY").ok())
    else {
        bail!("missing API key: pass --api-key or set SCIWHEEL_API_KEY");
    };

    let client = SciwheelClient::new(api_key);
    let items = client.list_items(&args.project_id).await?;
    println!("{} items in project {}", items.len(), args.project_id);
    for item in &items {
        println!(
            "{}  added_at={}  added_by={}  {}",
            item.id, item.added_at, item.added_by, item.title
        );
        if args.notes {
            for note in client.list_notes(&item.id).await? {
                println!(
                    "  note by {}  created={}  highlight={}  comment={:?}",
                    note.user,
                    note.created,
                    note.highlight_text.is_some(),
                    note.comment
                );
            }
        }
    }
    Ok(())
}
