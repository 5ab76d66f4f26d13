//! Document stores
//!
//! Profiles, subscriptions, plugins and rule-sets are each kept as one YAML
//! list. The compiler only ever sees snapshots taken from these lists.

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::generator::ProxyProvider;
use crate::models::Subscription;
use crate::vfs::{VfsError, VirtualFileSystem};

/// Reads a YAML list. A missing file is an empty list.
pub async fn load_list<T, F>(vfs: &F, path: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: VirtualFileSystem,
{
    let text = match vfs.read_text(path).await {
        Ok(text) => text,
        Err(VfsError::NotFound(_)) => {
            debug!("{} does not exist yet", path);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(&text).map_err(|e| Error::yaml(path, e))
}

pub async fn save_list<T, F>(vfs: &F, path: &str, items: &[T]) -> Result<()>
where
    T: Serialize,
    F: VirtualFileSystem,
{
    let text = serde_yaml::to_string(items).map_err(|e| Error::yaml(path, e))?;
    vfs.write_file(path, text.into_bytes()).await?;
    Ok(())
}

/// Subscriptions backed by their stored proxy lists
pub struct SubscriptionStore<'a, F> {
    vfs: &'a F,
    subscriptions: Vec<Subscription>,
}

impl<'a, F: VirtualFileSystem> SubscriptionStore<'a, F> {
    pub fn new(vfs: &'a F, subscriptions: Vec<Subscription>) -> Self {
        Self { vfs, subscriptions }
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Subscription> {
        self.subscriptions.iter_mut().find(|s| s.id == id)
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }
}

impl<F: VirtualFileSystem> ProxyProvider for SubscriptionStore<'_, F> {
    async fn load_proxies(&self, subscription_id: &str) -> Result<Vec<Value>> {
        let subscription = self
            .get(subscription_id)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription_id.to_string()))?;
        let text = self.vfs.read_text(&subscription.path).await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::json(format!("proxies of {}", subscription.name), e))
    }

    fn proxy_tag(&self, subscription_id: &str, proxy_id: &str) -> Option<String> {
        self.get(subscription_id)?
            .proxy_tag(proxy_id)
            .map(str::to_string)
    }
}
