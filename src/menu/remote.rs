//! Remote menu source: fetches the published menu document over HTTP.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::types::MenuRecord;
use crate::error::{MenuError, Result};

/// Anything that can produce the full menu in one call.
///
/// Implementations perform exactly one retrieval per call; retry policy
/// belongs to the caller.
pub trait MenuSource: Send + Sync + 'static {
  fn fetch(&self) -> impl Future<Output = Result<Vec<MenuRecord>>> + Send;
}

/// HTTP-backed menu source.
#[derive(Clone)]
pub struct RemoteMenuSource {
  client: reqwest::Client,
  url: Url,
}

impl RemoteMenuSource {
  /// Create a source for `url`. Requests exceeding `timeout` fail with
  /// `RemoteUnavailable`.
  pub fn new(url: Url, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| MenuError::RemoteUnavailable(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { client, url })
  }

  pub fn url(&self) -> &Url {
    &self.url
  }
}

impl MenuSource for RemoteMenuSource {
  async fn fetch(&self) -> Result<Vec<MenuRecord>> {
    debug!(url = %self.url, "fetching remote menu");

    let response = self
      .client
      .get(self.url.clone())
      .send()
      .await
      .map_err(|e| MenuError::RemoteUnavailable(describe_reqwest_error(&e)))?;

    let status = response.status();
    if !status.is_success() {
      return Err(MenuError::RemoteUnavailable(format!(
        "{} returned HTTP {}",
        self.url, status
      )));
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| MenuError::RemoteUnavailable(describe_reqwest_error(&e)))?;

    let records = parse_menu_document(&body)?;
    debug!(count = records.len(), "decoded remote menu");
    Ok(records)
  }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
  if e.is_timeout() {
    format!("request timed out: {}", e)
  } else {
    e.to_string()
  }
}

// ============================================================================
// Wire format
// ============================================================================

/// The endpoint publishes `{ "menu": [...] }`; a bare array is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum ApiMenuDocument {
  Wrapped { menu: Vec<ApiMenuItem> },
  Bare(Vec<ApiMenuItem>),
}

#[derive(Deserialize)]
struct ApiMenuItem {
  name: String,
  price: ApiPrice,
  #[serde(default)]
  description: String,
  #[serde(default)]
  image: String,
  category: String,
}

/// Prices show up both as JSON numbers and numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum ApiPrice {
  Number(f64),
  Text(String),
}

impl ApiPrice {
  fn to_f64(&self) -> Option<f64> {
    let price = match self {
      ApiPrice::Number(n) => Some(*n),
      ApiPrice::Text(s) => s.trim().parse::<f64>().ok(),
    };
    price.filter(|p| p.is_finite())
  }
}

/// Decode a menu document, assigning ids 1..=n in document order.
pub fn parse_menu_document(body: &[u8]) -> Result<Vec<MenuRecord>> {
  let document: ApiMenuDocument = serde_json::from_slice(body)
    .map_err(|e| MenuError::RemoteMalformed(format!("invalid menu document: {}", e)))?;

  let items = match document {
    ApiMenuDocument::Wrapped { menu } => menu,
    ApiMenuDocument::Bare(items) => items,
  };

  items
    .into_iter()
    .enumerate()
    .map(|(index, item)| {
      let price = item.price.to_f64().ok_or_else(|| {
        MenuError::RemoteMalformed(format!("item '{}' has an invalid price", item.name))
      })?;
      let category = item.category.trim().to_string();
      if category.is_empty() {
        return Err(MenuError::RemoteMalformed(format!(
          "item '{}' has no category",
          item.name
        )));
      }

      Ok(MenuRecord {
        id: index as i64 + 1,
        name: item.name,
        price,
        description: item.description,
        image: item.image,
        category,
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  const DOCUMENT: &str = r#"{
    "menu": [
      {"name": "Greek Salad", "price": "12.99", "description": "Crispy lettuce", "image": "greekSalad.jpg", "category": "starters"},
      {"name": "Lemon Dessert", "price": 5, "description": "Cake", "image": "lemonDessert.jpg", "category": "desserts"}
    ]
  }"#;

  /// Serve a single canned HTTP response on a loopback port.
  async fn serve_once(status: &'static str, body: &'static str) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 4096];
      let _ = socket.read(&mut buf).await;
      let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
      );
      let _ = socket.write_all(response.as_bytes()).await;
      let _ = socket.shutdown().await;
    });

    Url::parse(&format!("http://{}/menu.json", addr)).unwrap()
  }

  #[test]
  fn test_parse_assigns_sequential_ids() {
    let records = parse_menu_document(DOCUMENT.as_bytes()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 1);
    assert_eq!(records[0].name, "Greek Salad");
    assert!((records[0].price - 12.99).abs() < f64::EPSILON);
    assert_eq!(records[1].id, 2);
    assert_eq!(records[1].price, 5.0);
  }

  #[test]
  fn test_parse_bare_array() {
    let body = r#"[{"name": "Pasta", "price": 9.5, "category": "mains"}]"#;
    let records = parse_menu_document(body.as_bytes()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].description, "");
    assert_eq!(records[0].category, "mains");
  }

  #[test]
  fn test_parse_rejects_missing_category() {
    let body = r#"{"menu": [{"name": "Pasta", "price": 9.5, "category": "  "}]}"#;
    assert!(matches!(
      parse_menu_document(body.as_bytes()),
      Err(MenuError::RemoteMalformed(_))
    ));
  }

  #[test]
  fn test_parse_rejects_bad_price() {
    let body = r#"{"menu": [{"name": "Pasta", "price": "free", "category": "mains"}]}"#;
    assert!(matches!(
      parse_menu_document(body.as_bytes()),
      Err(MenuError::RemoteMalformed(_))
    ));
  }

  #[test]
  fn test_parse_rejects_wrong_shape() {
    assert!(matches!(
      parse_menu_document(br#"{"items": []}"#),
      Err(MenuError::RemoteMalformed(_))
    ));
  }

  #[tokio::test]
  async fn test_fetch_over_http() {
    let url = serve_once("200 OK", DOCUMENT).await;
    let source = RemoteMenuSource::new(url, Duration::from_secs(5)).unwrap();

    let records = source.fetch().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].category, "desserts");
  }

  #[tokio::test]
  async fn test_fetch_http_error_is_unavailable() {
    let url = serve_once("503 Service Unavailable", "").await;
    let source = RemoteMenuSource::new(url, Duration::from_secs(5)).unwrap();

    assert!(matches!(
      source.fetch().await,
      Err(MenuError::RemoteUnavailable(_))
    ));
  }

  #[tokio::test]
  async fn test_fetch_malformed_body() {
    let url = serve_once("200 OK", "not json").await;
    let source = RemoteMenuSource::new(url, Duration::from_secs(5)).unwrap();

    assert!(matches!(
      source.fetch().await,
      Err(MenuError::RemoteMalformed(_))
    ));
  }

  #[tokio::test]
  async fn test_fetch_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      // Accept and hold the connection without answering
      let (_socket, _) = listener.accept().await.unwrap();
      tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let url = Url::parse(&format!("http://{}/menu.json", addr)).unwrap();
    let source = RemoteMenuSource::new(url, Duration::from_millis(100)).unwrap();

    assert!(matches!(
      source.fetch().await,
      Err(MenuError::RemoteUnavailable(_))
    ));
  }
}
