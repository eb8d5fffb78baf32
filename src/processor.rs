use crate::config::RouteConfig;
use crate::dump::MailDumper;
use crate::error::ProcessError;
use crate::parser::MailParser;
use crate::publisher::{ContentPublisher, PublishOutcome};
use std::sync::Arc;

/// Parses, archives and publishes one raw message on one route.
pub struct MailProcessor {
    parser: Arc<dyn MailParser>,
    publisher: ContentPublisher,
}

impl MailProcessor {
    pub fn new(parser: Arc<dyn MailParser>, publisher: ContentPublisher) -> Self {
        Self { parser, publisher }
    }

    pub async fn process(
        &self,
        raw: &[u8],
        route: &RouteConfig,
    ) -> Result<PublishOutcome, ProcessError> {
        // archived before parsing so unreadable messages are kept too
        if let Some(folder) = &route.dump_folder {
            match MailDumper::new(folder).dump(raw) {
                Ok(path) => log::info!("Raw message saved to {}", path.display()),
                Err(e) => log::error!("Cannot save raw message in {}: {}", folder.display(), e),
            }
        }

        let mail = self.parser.parse(raw, Some(route))?;
        let outcome = self.publisher.publish(&mail, Some(route)).await?;

        let ids: Vec<String> = outcome.ids().iter().map(ToString::to_string).collect();
        log::info!("Contents from mail published as '{}'", ids.join(","));
        Ok(outcome)
    }
}
