//! HTTP client for applications registered on a client bastion.

use async_trait::async_trait;

use funcie_core::{Application, FuncieError, Message, Response, Result};

/// Delivers a message to a locally running application.
#[async_trait]
pub trait ApplicationClient: Send + Sync {
    async fn process_request(&self, application: &Application, request: &Message) -> Result<Response>;
}

/// `POST {endpoint}/process` with the message as JSON; the body of the reply
/// is the response.
#[derive(Clone, Default)]
pub struct HttpApplicationClient {
    client: reqwest::Client,
}

impl HttpApplicationClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn process_url(application: &Application) -> String {
    format!("{}/process", application.endpoint)
}

#[async_trait]
impl ApplicationClient for HttpApplicationClient {
    async fn process_request(&self, application: &Application, request: &Message) -> Result<Response> {
        let url = process_url(application);
        tracing::info!(
            message_id = %request.id,
            kind = %request.kind,
            application = %application.name,
            url = %url,
            "sending request to application"
        );

        let reply = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| FuncieError::Transport(format!("send request to {url}: {e}")))?;
        let body = reply
            .bytes()
            .await
            .map_err(|e| FuncieError::Transport(format!("read response from {url}: {e}")))?;

        Response::from_slice(&body).map_err(|e| {
            tracing::warn!(
                application = %application.name,
                payload = %String::from_utf8_lossy(&body),
                "application returned an undecodable response"
            );
            e.wrap(format!("deserialize response from {url}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use funcie_core::Endpoint;

    use super::*;

    #[test]
    fn url_appends_process() {
        let app = Application::new("a", Endpoint::new("http", "127.0.0.1", 8086));
        assert_eq!(process_url(&app), "http://127.0.0.1:8086/process");
    }
}
