use std::sync::{Arc, Mutex};
use tag_defs::{TagApplicableTo, TagMeta, TagValueType};
use tokio_test::assert_ok;
use tracing::instrument::WithSubscriber;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};
use video_tagger::{ensure_tag_meta, AnnotationApi, MockPlatform};

/// Collects the message of every WARN event.
#[derive(Clone, Default)]
struct WarningLog {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarningLog {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }
}

impl<S> Layer<S> for WarningLog
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.messages.lock().unwrap().push(visitor.message);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

fn orange(values: &[&str]) -> TagMeta {
    TagMeta::new("orange", TagValueType::OneofString)
        .with_applicable_to(TagApplicableTo::ObjectsOnly)
        .with_possible_values(values.iter().copied())
}

#[tokio::test]
async fn test_warning_only_when_existing_values_differ() {
    let log = WarningLog::default();
    let subscriber = Registry::default().with(log.clone());

    async {
        let (platform, context) = MockPlatform::with_demo_project().await;
        let meta = assert_ok!(platform.get_project_meta(context.project_id).await);

        let (_, meta) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["small", "big"]), meta).await);
        assert!(log.take().is_empty());

        // same values in another order
        let (_, meta) = assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["big", "small"]), meta).await);
        assert!(log.take().is_empty());

        assert_ok!(ensure_tag_meta(&platform, context.project_id, &orange(&["small", "medium"]), meta).await);
        let warnings = log.take();
        assert_eq!(warnings.len(), 1, "warnings: {:?}", warnings);
        assert!(warnings[0].contains("orange"), "warning: {}", warnings[0]);
        assert!(warnings[0].contains("another values"), "warning: {}", warnings[0]);
    }
    .with_subscriber(subscriber)
    .await;
}
