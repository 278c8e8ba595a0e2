use chrono_tz::Tz;

use crate::context::ResolvedValue;
use crate::error::Result;
use crate::llm::prompts;
use crate::pipeline::decisions::PreprocessDecision;
use crate::pipeline::{ExitReason, Pipeline, Stage, StageOutcome, TurnContext};
use crate::temporal::{Resolution, TemporalResolver};

use super::{Preprocessed, ResolvedMention};

impl Pipeline {
    /// Normalizes the text and resolves every date and back-reference it mentions.
    pub(crate) async fn preprocess(&self, ctx: &TurnContext) -> Result<StageOutcome<Preprocessed>> {
        let normalized = normalize_text(&ctx.message.text);
        if normalized.is_empty() {
            return Ok(StageOutcome::exit(
                ExitReason::Conversational,
                "Send me a message and I'll take care of it."
            ));
        }

        let prompt = prompts::preprocess_prompt(&normalized, &ctx.history, &ctx.local_now());
        let decision: PreprocessDecision = self.decide(Stage::Preprocess, &prompt).await?;

        let mut text = normalize_text(&decision.text);
        if text.is_empty() {
            text = normalized;
        }

        let resolve_ctx = ctx.resolve_context();
        let mut mentions = Vec::with_capacity(decision.references.len());

        for mention in decision.references {
            let surface = normalize_text(&mention.surface);
            let value = match TemporalResolver::resolve(&mention.reference, &resolve_ctx)? {
                Resolution::Instant(at) => ResolvedValue::Instant(at),
                Resolution::Range { start, end } => ResolvedValue::Range { start, end },
                Resolution::Lookup {
                    expression,
                    collection_hint,
                } => {
                    let found = ctx.context.lookup_reference(
                        ctx.user_id(),
                        ctx.conversation_id(),
                        &expression,
                        collection_hint.as_deref(),
                        ctx.seq,
                    );
                    let Some(value) = found else {
                        tracing::info!(
                            expression = %expression,
                            "Reference has nothing to point at"
                        );
                        let shown = if surface.is_empty() { expression } else { surface };
                        return Ok(StageOutcome::exit(
                            ExitReason::UnresolvedReference,
                            format!(
                                "I'm not sure what \"{shown}\" refers to. Which one do you mean?"
                            ),
                        ));
                    };
                    value
                }
            };

            if !surface.is_empty() {
                ctx.remember(&surface, value.clone());
                text = annotate(&text, &surface, &render_value(&value, ctx.message.time_zone));
            }
            mentions.push(ResolvedMention { surface, value });
        }

        tracing::debug!(mentions = mentions.len(), "Message preprocessed");
        Ok(StageOutcome::Advance(Preprocessed { text, mentions }))
    }
}

/// Trims, replaces control characters and collapses runs of whitespace.
pub(crate) fn normalize_text(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_value(value: &ResolvedValue, time_zone: Tz) -> String {
    match value {
        ResolvedValue::Document { collection, id } => format!("{collection} entry {id}"),
        ResolvedValue::Instant(at) => Resolution::Instant(*at).render(time_zone),
        ResolvedValue::Range { start, end } => Resolution::Range {
            start: *start,
            end: *end,
        }
        .render(time_zone),
    }
}

/// Puts `[rendered]` right after the first occurrence of `surface`, or at the end.
fn annotate(text: &str, surface: &str, rendered: &str) -> String {
    let position = text
        .find(surface)
        .or_else(|| text.to_ascii_lowercase().find(&surface.to_ascii_lowercase()));
    match position {
        Some(start) => {
            let end = start + surface.len();
            format!("{} [{rendered}]{}", &text[..end], &text[end..])
        }
        None => format!("{text} [{surface}: {rendered}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InboundMessage;
    use crate::pipeline::stages::testing::Harness;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  add\tmilk\n\n and  eggs\u{7} "), "add milk and eggs");
        assert_eq!(normalize_text("\u{0}\u{1b}"), "");
    }

    #[test]
    fn test_annotate_places_value_after_surface() {
        assert_eq!(
            annotate("Call mom Tomorrow please", "tomorrow", "2026-10-15"),
            "Call mom Tomorrow [2026-10-15] please"
        );
        assert_eq!(annotate("Call mom", "friday", "x"), "Call mom [friday: x]");
    }

    #[tokio::test]
    async fn test_dates_are_resolved_and_cached() {
        let harness = Harness::new().await;
        harness.reasoner.push(json!({
            "text": "Remind me tomorrow",
            "references": [{"surface": "tomorrow", "reference": {"kind": "temporal", "tag": "tomorrow"}}]
        }));
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let ctx = harness.turn(InboundMessage::new("u", "c", "remind me tomorrow"), now);

        let StageOutcome::Advance(out) = harness.pipeline.preprocess(&ctx).await.unwrap() else {
            panic!("expected advance");
        };
        assert_eq!(
            out.text,
            "Remind me tomorrow [from 2026-10-15T00:00:00+00:00 (inclusive) to 2026-10-16T00:00:00+00:00 (exclusive)]"
        );
        // Nothing is cached until the turn completes.
        assert_eq!(ctx.context.lookup_resolution("u", "c", "tomorrow", ctx.seq), None);
        assert_eq!(ctx.commit_resolutions(), 1);
        assert_eq!(
            ctx.context.lookup_resolution("u", "c", "tomorrow", ctx.seq),
            Some(out.mentions[0].value.clone())
        );
    }

    #[tokio::test]
    async fn test_unknown_back_reference_asks_for_clarification() {
        let harness = Harness::new().await;
        harness.reasoner.push(json!({
            "text": "delete it",
            "references": [{"surface": "it", "reference": {"kind": "anaphora", "surface": "it"}}]
        }));
        let ctx = harness.turn(InboundMessage::new("u", "c", "delete it"), Utc::now());

        let outcome = harness.pipeline.preprocess(&ctx).await.unwrap();
        let StageOutcome::Exit(exit) = outcome else {
            panic!("expected exit");
        };
        assert_eq!(exit.reason, ExitReason::UnresolvedReference);
        assert!(exit.reply.to_text().contains("\"it\""));
    }

    #[tokio::test]
    async fn test_back_reference_uses_last_touched_document() {
        let harness = Harness::new().await;
        harness.context.record_touched("u", "c", "Tasks", "t1", 1);
        harness.reasoner.push(json!({
            "text": "mark it done",
            "references": [{"surface": "it", "reference": {"kind": "anaphora", "surface": "it", "collection_hint": "Tasks"}}]
        }));
        let ctx = harness.turn(InboundMessage::new("u", "c", "mark it done"), Utc::now());

        let StageOutcome::Advance(out) = harness.pipeline.preprocess(&ctx).await.unwrap() else {
            panic!("expected advance");
        };
        assert_eq!(out.text, "mark it [Tasks entry t1] done");
        assert_eq!(out.referenced_ids("Tasks"), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_message_never_reaches_the_reasoner() {
        let harness = Harness::new().await;
        let ctx = harness.turn(InboundMessage::new("u", "c", " \n "), Utc::now());
        assert!(matches!(
            harness.pipeline.preprocess(&ctx).await.unwrap(),
            StageOutcome::Exit(_)
        ));
        assert_eq!(harness.reasoner.calls(), 0);
    }
}
