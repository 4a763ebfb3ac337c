use std::sync::Arc;

use crate::{FileStorage, Result, UploadContext, UploadError};

/// Registry of named storages deciding which one backs a write
#[derive(Debug, Default)]
pub struct StorageVoter {
    storages: Vec<Arc<FileStorage>>,
    default_storage: Option<String>,
    temp_storage: Option<Arc<FileStorage>>,
}

impl StorageVoter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the storage used when the context does not pick one
    pub fn with_default_storage<S: Into<String>>(mut self, name: S) -> Self {
        self.default_storage = Some(name.into());
        self
    }

    /// Storage holding unfinished uploads
    pub fn with_temp_storage(mut self, storage: FileStorage) -> Self {
        self.temp_storage = Some(Arc::new(storage));
        self
    }

    pub fn with_storage(mut self, storage: FileStorage) -> Result<Self> {
        self.add_storage(storage)?;
        Ok(self)
    }

    /// Register a named storage; names are unique
    pub fn add_storage(&mut self, storage: FileStorage) -> Result<()> {
        if self.storages.iter().any(|s| s.name() == storage.name()) {
            return Err(UploadError::DuplicateStorage {
                name: storage.name().to_string(),
            });
        }
        self.storages.push(Arc::new(storage));
        Ok(())
    }

    pub fn storage(&self, name: &str) -> Option<&Arc<FileStorage>> {
        self.storages.iter().find(|s| s.name() == name)
    }

    pub fn storages(&self) -> &[Arc<FileStorage>] {
        &self.storages
    }

    pub fn temp_storage(&self) -> Option<&Arc<FileStorage>> {
        self.temp_storage.as_ref()
    }

    pub fn is_temp(&self, storage: &Arc<FileStorage>) -> bool {
        self.temp_storage
            .as_ref()
            .is_some_and(|temp| Arc::ptr_eq(temp, storage))
    }

    /// Storage backing the current write of the context
    pub fn select_storage(&self, ctx: &UploadContext) -> Result<Arc<FileStorage>> {
        if self.storages.is_empty() {
            return Err(UploadError::NoStorageConfigured);
        }

        match &self.temp_storage {
            Some(temp) if ctx.unfinished => Ok(temp.clone()),
            _ => self.finished_storage(ctx),
        }
    }

    /// Storage the completed file lives in, whatever the context state
    pub fn finished_storage(&self, ctx: &UploadContext) -> Result<Arc<FileStorage>> {
        let name = ctx.storage_name.as_ref().or(self.default_storage.as_ref());

        match name {
            Some(name) => self
                .storage(name)
                .cloned()
                .ok_or_else(|| UploadError::unknown_storage(name.as_str())),
            None => self
                .storages
                .first()
                .cloned()
                .ok_or(UploadError::NoStorageConfigured),
        }
    }

    /// Allowlist of the destination storage, `None` when it accepts anything
    pub fn accepted_mime_types(&self, ctx: &UploadContext) -> Result<Option<Vec<String>>> {
        let storage = self.finished_storage(ctx)?;
        if storage.check_mime_type() {
            Ok(Some(storage.accepted_mime_types().to_vec()))
        } else {
            Ok(None)
        }
    }
}
