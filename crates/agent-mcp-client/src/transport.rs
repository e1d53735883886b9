//! JSON-RPC 2.0 over HTTP POST, the transport used against a remote MCP
//! server. Bearer auth is attached from the server's current access token,
//! if any.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::types::{JsonRpcRequest, JsonRpcResponse};

pub struct HttpJsonRpcTransport {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpJsonRpcTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn request(&self, method: &str, params: Option<serde_json::Value>, bearer: Option<&str>) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = JsonRpcRequest::new(id, method, params);

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let resp: JsonRpcResponse = req.send().await?.error_for_status()?.json().await?;

        if let Some(err) = resp.error {
            return Err(Error::Remote(format!("{} ({})", err.message, err.code)));
        }
        Ok(resp.result.unwrap_or(serde_json::Value::Null))
    }

    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>, bearer: Option<&str>) -> Result<()> {
        let body = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params});
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_surfaces_jsonrpc_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#)
            .create_async()
            .await;

        let transport = HttpJsonRpcTransport::new(server.url());
        let err = transport.request("tools/list", None, None).await.unwrap_err();
        assert!(err.to_string().contains("method not found"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn request_returns_the_result_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#)
            .create_async()
            .await;

        let transport = HttpJsonRpcTransport::new(server.url());
        let result = transport.request("tools/list", None, None).await.unwrap();
        assert_eq!(result, serde_json::json!({"tools": []}));
    }
}
