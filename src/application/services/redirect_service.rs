//! Alias management and resolution.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::application::updater::{Deadline, OptimisticUpdater, RetryPolicy};
use crate::domain::entities::{
    ALIAS_KEY_PREFIX, AliasKind, ClientTally, NewRedirect, Redirect, RedirectPatch,
};
use crate::domain::repositories::RecordStore;
use crate::error::AppError;
use crate::infrastructure::cache::AliasCache;
use crate::utils::alias::{generate_alias, validate_alias};
use crate::utils::destination::normalize_destination;

/// Default length of generated aliases.
pub const DEFAULT_RANDOM_ALIAS_LENGTH: usize = 6;

/// Default deadline for a single read-modify-write.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Service for creating, changing and resolving aliases.
///
/// Reads go through the cache; every mutation goes to the store and then
/// invalidates the alias so the next resolve reloads it.
pub struct RedirectService<S: RecordStore + ?Sized> {
    store: Arc<S>,
    cache: Arc<dyn AliasCache>,
    updater: OptimisticUpdater<S>,
    update_timeout: Duration,
    random_alias_length: usize,
}

impl<S: RecordStore + ?Sized> RedirectService<S> {
    /// Creates a service with immediate retries and default settings.
    pub fn new(store: Arc<S>, cache: Arc<dyn AliasCache>) -> Self {
        Self {
            updater: OptimisticUpdater::new(store.clone()),
            store,
            cache,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            random_alias_length: DEFAULT_RANDOM_ALIAS_LENGTH,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.updater = OptimisticUpdater::with_policy(self.store.clone(), policy);
        self
    }

    pub fn with_update_timeout(mut self, timeout: Duration) -> Self {
        self.update_timeout = timeout;
        self
    }

    pub fn with_random_alias_length(mut self, length: usize) -> Self {
        self.random_alias_length = length;
        self
    }

    /// Resolves an alias for redirection.
    ///
    /// Checks the cache first and falls back to the store, caching what it loads.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the alias does not exist or its
    /// `valid_from` is still in the future.
    /// Returns [`AppError::Unavailable`] if the store cannot be reached.
    pub async fn resolve(&self, alias: &str) -> Result<Arc<Redirect>, AppError> {
        let redirect = match self.cache.get_redirect(alias) {
            Some(cached) => cached,
            None => {
                let loaded = Arc::new(self.fetch(alias).await?);
                self.cache.set_redirect(alias, loaded.clone());
                loaded
            }
        };

        if !redirect.is_active() {
            debug!("Alias {} not active until {}", alias, redirect.valid_from);
            return Err(AppError::not_found(
                "Alias not found",
                json!({ "alias": alias }),
            ));
        }

        Ok(redirect)
    }

    /// Creates a redirect.
    ///
    /// `Short` aliases are validated as given. `Random` aliases are generated,
    /// retrying on collision up to 10 times.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] if the URL or alias is invalid.
    /// Returns [`AppError::Conflict`] if a `Short` alias already exists.
    pub async fn create(&self, new_redirect: NewRedirect) -> Result<Redirect, AppError> {
        let url = normalize_destination(&new_redirect.url)?;

        let redirect = match new_redirect.kind {
            AliasKind::Short => {
                let alias = new_redirect.alias.clone().ok_or_else(|| {
                    AppError::bad_request("Alias is required for short redirects", json!({}))
                })?;
                validate_alias(&alias)?;

                let redirect = Redirect::new(new_redirect, alias, url, Utc::now());
                self.insert(&redirect).await?;
                redirect
            }
            AliasKind::Random => self.create_random(new_redirect, url).await?,
        };

        self.cache.invalidate(&redirect.alias);
        info!("Created alias {} -> {}", redirect.alias, redirect.url);
        Ok(redirect)
    }

    /// Changes an existing redirect, keeping its counters.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] if the patch is empty or carries an invalid URL.
    /// Returns [`AppError::NotFound`] if the alias does not exist.
    /// Returns [`AppError::Canceled`] if the update timeout elapses under contention.
    pub async fn update(&self, alias: &str, mut patch: RedirectPatch) -> Result<Redirect, AppError> {
        if patch.is_empty() {
            return Err(AppError::bad_request(
                "Nothing to update",
                json!({ "alias": alias }),
            ));
        }
        if let Some(url) = &patch.url {
            patch.url = Some(normalize_destination(url)?);
        }

        let result = self
            .updater
            .update(
                &Redirect::store_key(alias),
                Deadline::after(self.update_timeout),
                |mut redirect: Redirect| {
                    redirect.apply(&patch, Utc::now());
                    Ok(redirect)
                },
            )
            .await;
        self.cache.invalidate(alias);

        result.map_err(|e| alias_error(e, alias))
    }

    /// Replaces a stored redirect wholesale, counters included.
    ///
    /// Used by the import path. Creates the record if it does not exist.
    pub async fn overwrite(&self, redirect: &Redirect) -> Result<(), AppError> {
        validate_alias(&redirect.alias)?;
        let key = Redirect::store_key(&redirect.alias);
        let payload = encode(redirect)?;

        match self.store.update(&key, payload.clone()).await {
            Err(e) if e.is_not_found() => self.store.create(&key, payload).await?,
            other => other?,
        }

        self.cache.invalidate(&redirect.alias);
        Ok(())
    }

    /// Deletes a redirect.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the alias does not exist.
    pub async fn delete(&self, alias: &str) -> Result<(), AppError> {
        let removed = self.store.delete(&Redirect::store_key(alias)).await?;
        self.cache.invalidate(alias);

        if !removed {
            return Err(AppError::not_found(
                "Alias not found",
                json!({ "alias": alias }),
            ));
        }
        self.store.delete(&ClientTally::store_key(alias)).await?;
        info!("Deleted alias {}", alias);
        Ok(())
    }

    /// Reads a redirect straight from the store, bypassing the cache.
    ///
    /// Inactive redirects are returned as well.
    pub async fn fetch(&self, alias: &str) -> Result<Redirect, AppError> {
        let payload = self
            .store
            .get(&Redirect::store_key(alias))
            .await
            .map_err(|e| alias_error(e, alias))?;
        decode(alias, &payload)
    }

    /// Lists every redirect, sorted by alias.
    pub async fn list(&self) -> Result<Vec<Redirect>, AppError> {
        let mut keys = self.store.keys(ALIAS_KEY_PREFIX).await?;
        keys.sort();

        let mut redirects = Vec::with_capacity(keys.len());
        for key in keys {
            let alias = key.trim_start_matches(ALIAS_KEY_PREFIX);
            match self.store.get(&key).await {
                Ok(payload) => redirects.push(decode(alias, &payload)?),
                // Deleted between the scan and the read.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(redirects)
    }

    async fn insert(&self, redirect: &Redirect) -> Result<(), AppError> {
        let payload = encode(redirect)?;
        self.store
            .create(&Redirect::store_key(&redirect.alias), payload)
            .await
            .map_err(|e| match e {
                AppError::Conflict { .. } => AppError::conflict(
                    "Alias already exists",
                    json!({ "alias": redirect.alias }),
                ),
                other => other,
            })
    }

    async fn create_random(&self, new_redirect: NewRedirect, url: String) -> Result<Redirect, AppError> {
        const MAX_ATTEMPTS: usize = 10;

        for _ in 0..MAX_ATTEMPTS {
            let alias = generate_alias(self.random_alias_length);
            let redirect = Redirect::new(new_redirect.clone(), alias, url.clone(), Utc::now());

            match self.insert(&redirect).await {
                Ok(()) => return Ok(redirect),
                Err(AppError::Conflict { .. }) => {
                    debug!("Generated alias {} collided", redirect.alias);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::internal(
            "Failed to generate unique alias",
            json!({ "reason": "Too many collisions" }),
        ))
    }
}

fn alias_error(e: AppError, alias: &str) -> AppError {
    if e.is_not_found() {
        AppError::not_found("Alias not found", json!({ "alias": alias }))
    } else {
        e
    }
}

fn encode(redirect: &Redirect) -> Result<String, AppError> {
    serde_json::to_string(redirect).map_err(|e| {
        AppError::internal(
            "Unable to encode redirect",
            json!({ "alias": redirect.alias, "reason": e.to_string() }),
        )
    })
}

fn decode(alias: &str, payload: &str) -> Result<Redirect, AppError> {
    serde_json::from_str(payload).map_err(|e| {
        AppError::internal(
            "Corrupted record",
            json!({ "alias": alias, "reason": e.to_string() }),
        )
    })
}
