//! Storage coalescer.
//!
//! Per-process cache of typed instances backed by router files. Loading an
//! instance reads it once through the router; after every successful
//! request [`StorageCoalescer::flush`] re-serializes each instance marked
//! `save` and writes only the ones whose bytes moved since the last write,
//! then announces the change so other tools drop their cached copies.
//!
//! An invalidation never orphans a handle a request still holds: such
//! instances are marked stale instead and refreshed by the next `load`.

use super::error::StorageError;
use crate::router::{RouterClient, RouterClientError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tooldesk_domain::{StorageFormat, validate_relative_path};
use tracing::{debug, warn};

/// Where instance bytes come from and go to.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, RouterClientError>;

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), RouterClientError>;

    /// Announce that files owned by `app_name` changed.
    async fn changed(&self, app_name: &str) -> Result<(), RouterClientError>;

    /// Surface a persistence failure to the host log.
    async fn report(&self, app_name: &str, text: &str);
}

#[async_trait]
impl StorageBackend for RouterClient {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, RouterClientError> {
        self.read_file(path).await
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), RouterClientError> {
        self.write_file(path, bytes).await
    }

    async fn changed(&self, app_name: &str) -> Result<(), RouterClientError> {
        self.storage_changed(app_name).await
    }

    async fn report(&self, app_name: &str, text: &str) {
        let _ = self.print(app_name, text).await;
    }
}

type Erased = Arc<dyn Any + Send + Sync>;

/// Serializes an erased `Mutex<T>`. `Ok(None)` when `wait` is false and
/// the instance is locked by a running request.
type EncodeFn = fn(&Erased, StorageFormat, bool) -> Result<Option<Vec<u8>>, String>;

struct Instance {
    value: Erased,
    encode: EncodeFn,
    format: StorageFormat,
    last_written: Vec<u8>,
    save: Arc<AtomicBool>,
    /// Another tool changed the file while a handle was alive.
    stale: bool,
}

/// Typed view of a cached instance.
pub struct InstanceHandle<T> {
    path: String,
    value: Arc<Mutex<T>>,
    save: Arc<AtomicBool>,
}

impl<T> Clone for InstanceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            value: Arc::clone(&self.value),
            save: Arc::clone(&self.save),
        }
    }
}

impl<T> InstanceHandle<T> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Include or exclude the instance from flushes.
    pub fn set_save(&self, save: bool) {
        self.save.store(save, Ordering::Relaxed);
    }

    pub fn is_saved(&self) -> bool {
        self.save.load(Ordering::Relaxed)
    }
}

pub(crate) fn encode_value<T: Serialize>(value: &T, format: StorageFormat) -> Result<Vec<u8>, String> {
    match format {
        StorageFormat::Json => serde_json::to_vec_pretty(value).map_err(|e| e.to_string()),
        StorageFormat::Xml => quick_xml::se::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| e.to_string()),
    }
}

pub(crate) fn decode_value<T: DeserializeOwned>(bytes: &[u8], format: StorageFormat) -> Result<T, String> {
    match format {
        StorageFormat::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
        StorageFormat::Xml => {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            quick_xml::de::from_str(text).map_err(|e| e.to_string())
        }
    }
}

fn encode_erased<T: Serialize + Send + 'static>(
    value: &Erased,
    format: StorageFormat,
    wait: bool,
) -> Result<Option<Vec<u8>>, String> {
    let cell = value
        .downcast_ref::<Mutex<T>>()
        .ok_or_else(|| "cached instance has an unexpected type".to_string())?;
    let guard = if wait {
        cell.lock().unwrap_or_else(|e| e.into_inner())
    } else {
        match cell.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(None),
        }
    };
    encode_value(&*guard, format).map(Some)
}

/// Decode file contents, or the default when the file is missing. The
/// second element is the canonical encoding used as `last_written`.
fn decode_file<T>(
    path: &str,
    bytes: Option<Vec<u8>>,
    format: StorageFormat,
) -> Result<(T, Vec<u8>), StorageError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let Some(bytes) = bytes else {
        return Ok((T::default(), Vec::new()));
    };
    let value: T = decode_value(&bytes, format).map_err(|message| StorageError::Decode {
        path: path.to_string(),
        message,
    })?;
    // Compare future writes against the canonical encoding so a file
    // written by someone else does not look dirty.
    let canonical = encode_value(&value, format).map_err(|message| StorageError::Encode {
        path: path.to_string(),
        message,
    })?;
    Ok((value, canonical))
}

pub struct StorageCoalescer {
    app_name: String,
    backend: Arc<dyn StorageBackend>,
    instances: Mutex<HashMap<String, Instance>>,
}

impl StorageCoalescer {
    pub fn new(app_name: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            app_name: app_name.into(),
            backend,
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instance>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn cached<T: Send + 'static>(
        &self,
        path: &str,
        save: bool,
    ) -> Result<Option<(InstanceHandle<T>, bool)>, StorageError> {
        let instances = self.lock();
        let Some(instance) = instances.get(path) else {
            return Ok(None);
        };
        let value = Arc::clone(&instance.value)
            .downcast::<Mutex<T>>()
            .map_err(|_| StorageError::TypeMismatch {
                path: path.to_string(),
            })?;
        if save {
            instance.save.store(true, Ordering::Relaxed);
        }
        let handle = InstanceHandle {
            path: path.to_string(),
            value,
            save: Arc::clone(&instance.save),
        };
        Ok(Some((handle, instance.stale)))
    }

    /// Re-read a stale instance into its existing cell. Local modifications
    /// win: a dirty or locked instance is left for the next flush or load.
    async fn refresh<T>(&self, handle: &InstanceHandle<T>, format: StorageFormat) -> Result<(), StorageError>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        let path = handle.path();
        let bytes = self
            .backend
            .read(path)
            .await
            .map_err(|source| StorageError::Read {
                path: path.to_string(),
                source,
            })?;
        let (fresh, canonical) = decode_file::<T>(path, bytes, format)?;

        let mut instances = self.lock();
        let erased: Erased = handle.value.clone();
        let Some(instance) = instances
            .get_mut(path)
            .filter(|instance| Arc::ptr_eq(&instance.value, &erased))
        else {
            return Ok(());
        };
        let mut current = match handle.value.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(()),
        };
        let dirty = encode_value(&*current, instance.format)
            .map(|bytes| bytes != instance.last_written)
            .unwrap_or(true);
        if !dirty {
            *current = fresh;
            instance.last_written = canonical;
            instance.stale = false;
            debug!(app = %self.app_name, path, "stale instance refreshed");
        }
        Ok(())
    }

    /// Return the cached instance at `path`, reading it through the backend
    /// on first use. A missing file yields `T::default()`.
    pub async fn load<T>(
        &self,
        path: &str,
        format: StorageFormat,
        save: bool,
    ) -> Result<InstanceHandle<T>, StorageError>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        validate_relative_path(path)?;
        if let Some((handle, stale)) = self.cached::<T>(path, save)? {
            if stale {
                self.refresh(&handle, format).await?;
            }
            return Ok(handle);
        }

        let bytes = self
            .backend
            .read(path)
            .await
            .map_err(|source| StorageError::Read {
                path: path.to_string(),
                source,
            })?;
        let (value, last_written) = decode_file::<T>(path, bytes, format)?;
        debug!(app = %self.app_name, path, "instance loaded");

        let value = Arc::new(Mutex::new(value));
        let save_flag = Arc::new(AtomicBool::new(save));
        {
            let mut instances = self.lock();
            if !instances.contains_key(path) {
                let erased: Erased = value.clone();
                instances.insert(
                    path.to_string(),
                    Instance {
                        value: erased,
                        encode: encode_erased::<T>,
                        format,
                        last_written,
                        save: Arc::clone(&save_flag),
                        stale: false,
                    },
                );
                return Ok(InstanceHandle {
                    path: path.to_string(),
                    value,
                    save: save_flag,
                });
            }
        }
        // A concurrent request cached it first.
        self.cached::<T>(path, save)?
            .map(|(handle, _)| handle)
            .ok_or_else(|| StorageError::TypeMismatch {
                path: path.to_string(),
            })
    }

    /// Write every saved instance whose serialization differs from the last
    /// written bytes. Returns the number of files written.
    ///
    /// Failures are logged and reported to the host; the in-memory value is
    /// kept so the next flush retries.
    pub async fn flush(&self) -> usize {
        let pending: Vec<(String, Erased, EncodeFn, StorageFormat, Vec<u8>)> = self
            .lock()
            .iter()
            .filter(|(_, instance)| instance.save.load(Ordering::Relaxed))
            .map(|(path, instance)| {
                (
                    path.clone(),
                    Arc::clone(&instance.value),
                    instance.encode,
                    instance.format,
                    instance.last_written.clone(),
                )
            })
            .collect();

        let mut written = 0;
        for (path, value, encode, format, last_written) in pending {
            let bytes = match encode(&value, format, false) {
                Ok(Some(bytes)) => bytes,
                // Held by another request; its own flush picks it up.
                Ok(None) => continue,
                Err(message) => {
                    self.report(&format!("Failed to encode {}: {}", path, message))
                        .await;
                    continue;
                }
            };
            if bytes == last_written {
                continue;
            }
            match self.backend.write(&path, &bytes).await {
                Ok(()) => {
                    written += 1;
                    let mut instances = self.lock();
                    if let Some(instance) = instances.get_mut(&path)
                        && Arc::ptr_eq(&instance.value, &value)
                    {
                        instance.last_written = bytes;
                        instance.stale = false;
                    }
                }
                Err(e) => {
                    self.report(&format!("Failed to write {}: {}", path, e)).await;
                }
            }
        }

        if written > 0 {
            debug!(app = %self.app_name, written, "instances flushed");
            if let Err(e) = self.backend.changed(&self.app_name).await {
                warn!(app = %self.app_name, error = %e, "storage_changed failed");
            }
        }
        written
    }

    /// Drop every instance without unsaved modifications so the next load
    /// re-reads it. Returns the number dropped.
    ///
    /// Instances locked by a running request are kept. So are instances a
    /// request still holds a handle to; those are marked stale, keep
    /// receiving that request's writes and get refreshed on the next load.
    pub fn invalidate_clean(&self) -> usize {
        let mut instances = self.lock();
        let before = instances.len();
        instances.retain(|path, instance| {
            let clean = match (instance.encode)(&instance.value, instance.format, false) {
                Ok(Some(bytes)) => {
                    !(instance.save.load(Ordering::Relaxed) && bytes != instance.last_written)
                }
                Ok(None) | Err(_) => false,
            };
            if !clean {
                return true;
            }
            if Arc::strong_count(&instance.value) > 1 {
                debug!(app = %self.app_name, path = %path, "instance in use; marked stale");
                instance.stale = true;
                return true;
            }
            false
        });
        before - instances.len()
    }

    async fn report(&self, text: &str) {
        warn!(app = %self.app_name, "{}", text);
        self.backend.report(&self.app_name, text).await;
    }
}
