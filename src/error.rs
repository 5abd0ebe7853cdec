//! Error taxonomy for the menu cache.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MenuError>;

#[derive(Debug, Error)]
pub enum MenuError {
  /// The database could not be opened or migrated.
  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  /// A write (replace or metadata update) failed. Prior contents stay schema-valid.
  #[error("storage write failed: {0}")]
  StorageWriteError(String),

  /// A read against the store failed.
  #[error("storage read failed: {0}")]
  StorageReadError(String),

  /// Network failure, non-success status, or timeout.
  #[error("remote menu unavailable: {0}")]
  RemoteUnavailable(String),

  /// The remote document did not decode into menu records.
  #[error("remote menu malformed: {0}")]
  RemoteMalformed(String),

  #[error("bootstrap failed: {0}")]
  BootstrapFailed(#[source] Box<MenuError>),

  /// Operation requires the cache to be bootstrapped first.
  #[error("menu cache is not ready")]
  NotReady,

  #[error("configuration error: {0}")]
  Config(String),
}

impl MenuError {
  /// Wrap a store or remote failure raised while bootstrapping.
  pub fn bootstrap(err: MenuError) -> Self {
    match err {
      MenuError::BootstrapFailed(_) => err,
      other => MenuError::BootstrapFailed(Box::new(other)),
    }
  }

  /// True for failures a caller may reasonably retry.
  pub fn is_retryable(&self) -> bool {
    match self {
      MenuError::RemoteUnavailable(_) | MenuError::StorageWriteError(_) => true,
      MenuError::BootstrapFailed(inner) => inner.is_retryable(),
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bootstrap_wraps_once() {
    let err = MenuError::bootstrap(MenuError::RemoteUnavailable("down".into()));
    let err = MenuError::bootstrap(err);
    match err {
      MenuError::BootstrapFailed(inner) => {
        assert!(matches!(*inner, MenuError::RemoteUnavailable(_)))
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_retryable() {
    assert!(MenuError::bootstrap(MenuError::RemoteUnavailable("x".into())).is_retryable());
    assert!(!MenuError::bootstrap(MenuError::RemoteMalformed("x".into())).is_retryable());
    assert!(!MenuError::NotReady.is_retryable());
  }
}
