use std::{
    fmt,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};

use crate::LeakygateError;

/// A round-robin set of [`redis::aio::ConnectionManager`]s.
///
/// Each `ConnectionManager` multiplexes one connection and reconnects on its own;
/// spreading calls over several of them avoids head-of-line blocking on a hot
/// store. Clones share the same connections.
pub struct RedisConnectionPool {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl RedisConnectionPool {
    /// Create a pool holding a single connection manager opened from `client`.
    pub async fn default_from_client(client: Client) -> Result<Self, LeakygateError> {
        Self::from_client(client, 1).await
    }

    /// Create a pool of `connection_count` connection managers opened from `client`.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, LeakygateError> {
        if connection_count == 0 {
            return Err(LeakygateError::InvalidConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_managers: Arc::new(vec![connection_manager]),
            track_index: AtomicUsize::new(0),
        }
    }

    /// Number of connection managers in the pool.
    pub fn len(&self) -> usize {
        self.connection_managers.len()
    }

    /// Always `false`; a pool holds at least one connection manager.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Get the next [`redis::aio::ConnectionManager`] in round-robin order.
    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get
} // end impl RedisConnectionPool

impl fmt::Debug for RedisConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnectionPool")
            .field("connection_managers", &self.connection_managers.len())
            .field("track_index", &self.track_index)
            .finish()
    }
}

impl Clone for RedisConnectionPool {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

impl From<ConnectionManager> for RedisConnectionPool {
    fn from(connection_manager: ConnectionManager) -> Self {
        Self::from_connection_manager(connection_manager)
    }
}

/// A validated namespace for rate limit keys.
///
/// Stored keys take the form `<prefix>:<key>`. A prefix:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
///
/// The default prefix is `RATE_LIMIT`.
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    /// The fully namespaced store key for `key`.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.0, key)
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self(Arc::from("RATE_LIMIT"))
    }
}

impl Deref for KeyPrefix {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = LeakygateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(LeakygateError::InvalidKeyPrefix(
                "key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(LeakygateError::InvalidKeyPrefix(
                "key prefix must not be longer than 255 bytes".to_string(),
            ))
        } else if value.contains(':') {
            Err(LeakygateError::InvalidKeyPrefix(
                "key prefix must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for KeyPrefix {
    type Error = LeakygateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}
