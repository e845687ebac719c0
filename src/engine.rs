//! The sync core: per-route watermark tracking, candidate selection,
//! message composition and strictly sequential, paced delivery.
use crate::mentions;
use crate::model::{latest_comment, Recipient, SourceItem};
use crate::sciwheel::SourceService;
use crate::slack::DeliveryService;
use crate::state::SyncRoute;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Composed messages longer than this are replaced by the short fallback.
pub const MESSAGE_CEILING: usize = 3000;

/// Per-run, per-route delivery state. A halt stops further deliveries on
/// that route for this run only; the next run re-fetches from the
/// persisted watermark and re-attempts everything after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Active,
    Halted,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub delivered: usize,
    pub failed: usize,
    pub routes_changed: usize,
}

impl SyncReport {
    /// True when at least one watermark advanced and the table needs a
    /// write-back.
    pub fn changed(&self) -> bool {
        self.routes_changed > 0
    }
}

/// Items strictly newer than the watermark, reversed from the server's
/// newest-first order to oldest-first so delivery stays chronological.
pub fn candidates_after(items: &[SourceItem], watermark: i64) -> Vec<SourceItem> {
    let mut out: Vec<SourceItem> = items
        .iter()
        .filter(|item| item.added_at > watermark)
        .cloned()
        .collect();
    out.reverse();
    out
}

pub fn compose_message(item: &SourceItem, note_text: Option<&str>) -> String {
    let mut msg = String::from(":book:");
    if let Some(note) = note_text {
        msg.push_str(note.trim_end());
        msg.push_str(". ");
    }
    if !item.authors_text.is_empty() {
        msg.push_str(&item.authors_text);
        msg.push(' ');
    }
    msg.push_str(&format!("<{}|{}.>", item.full_text_link, item.title));
    if !item.journal_name.is_empty() {
        msg.push(' ');
        msg.push_str(&item.journal_name);
    }
    if let Some(year) = item.published_year {
        msg.push_str(&format!(" ({year})"));
    }
    msg.push_str(&format!(" added by: {}", item.added_by));
    if !item.tags.is_empty() {
        msg.push_str(&format!(" [{}]", item.tags.join(", ")));
    }
    msg
}

/// Short form used when the full message blows the ceiling: link, title
/// and added-by only. The detail is dropped, not wrapped.
pub fn fallback_message(item: &SourceItem) -> String {
    format!(
        ":book:<{}|{}.> added by: {}",
        item.full_text_link, item.title, item.added_by
    )
}

pub fn enforce_ceiling(message: String, item: &SourceItem) -> String {
    if message.chars().count() > MESSAGE_CEILING {
        fallback_message(item)
    } else {
        message
    }
}

/// One full sync pass over the route table.
///
/// Each project is fetched at most once even when several routes share
/// it; watermarks stay per route. A route's watermark only moves forward,
/// and only as far as its last successfully delivered item. Source
/// failures degrade to "no new items" for the affected routes; delivery
/// failures halt the failing route and leave the others untouched.
pub async fn run_sync(
    routes: &mut [SyncRoute],
    source: &dyn SourceService,
    delivery: &dyn DeliveryService,
    roster: &[Recipient],
    pacing: Duration,
) -> SyncReport {
    let mut report = SyncReport::default();
    let mut fetched: HashMap<String, Vec<SourceItem>> = HashMap::new();

    for route in routes.iter_mut() {
        if !fetched.contains_key(&route.project_id) {
            let items = match source.list_items(&route.project_id).await {
                Ok(items) => items,
                Err(err) => {
                    warn!(
                        channel = %route.channel,
                        project_id = %route.project_id,
                        %err,
                        "item fetch failed; treating as no new items"
                    );
                    Vec::new()
                }
            };
            fetched.insert(route.project_id.clone(), items);
        }
        let candidates = candidates_after(&fetched[&route.project_id], route.last_date);
        if candidates.is_empty() {
            info!(
                channel = %route.channel,
                project_id = %route.project_id,
                "no new items for route"
            );
            continue;
        }
        info!(
            channel = %route.channel,
            project_id = %route.project_id,
            count = candidates.len(),
            "delivering new items"
        );

        let mut state = RouteState::Active;
        let mut watermark = route.last_date;
        for (idx, item) in candidates.iter().enumerate() {
            let note_text = match source.list_notes(&item.id).await {
                Ok(notes) => latest_comment(&notes).and_then(|n| n.comment.clone()),
                Err(err) => {
                    warn!(
                        channel = %route.channel,
                        item_id = %item.id,
                        %err,
                        "note fetch failed; delivering without note"
                    );
                    None
                }
            };
            let resolved = note_text.map(|text| mentions::resolve(&text, roster));
            let message = enforce_ceiling(compose_message(item, resolved.as_deref()), item);

            // Fixed inter-message pause; the destination rate limit is
            // undocumented and this throttle is the whole policy.
            if idx > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }

            match delivery.send(&route.webhook, &message).await {
                Ok(()) => {
                    report.delivered += 1;
                    if item.added_at > watermark {
                        watermark = item.added_at;
                    }
                    info!(
                        channel = %route.channel,
                        item_id = %item.id,
                        added_at = item.added_at,
                        "delivered item"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        channel = %route.channel,
                        item_id = %item.id,
                        %err,
                        "delivery failed; halting route for this run"
                    );
                    state = RouteState::Halted;
                }
            }
            if state == RouteState::Halted {
                break;
            }
        }

        if watermark > route.last_date {
            route.last_date = watermark;
            report.routes_changed += 1;
            let stamp = Utc
                .timestamp_millis_opt(watermark)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| watermark.to_string());
            info!(channel = %route.channel, watermark = %stamp, "watermark advanced");
        }
    }
    report
}
