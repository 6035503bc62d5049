use async_trait::async_trait;

/// Port for the downstream AI responder (black-box text completion).
///
/// Infallible by contract: the adapter maps outages to a fixed apology
/// reply so a dependency failure never surfaces as an error here.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, prompt: &str, context: Option<&str>) -> String;
}
