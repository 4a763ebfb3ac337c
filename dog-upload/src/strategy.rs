use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::UploadContext;

/// Computes the file name of a newly stored file
pub trait NamingStrategy: Send + Sync {
    fn file_name(&self, ctx: &UploadContext) -> String;
}

/// Computes the directory a newly named file is placed in.
///
/// An empty string places the file at the root of the filesystem.
pub trait StorageStrategy: Send + Sync {
    fn directory(&self, ctx: &UploadContext, file_name: &str) -> String;
}

/// Random uuid names, keeping an extension matching the declared content type
#[derive(Debug, Clone, Default)]
pub struct UniqueNamingStrategy;

impl NamingStrategy for UniqueNamingStrategy {
    fn file_name(&self, ctx: &UploadContext) -> String {
        let id = Uuid::new_v4().simple().to_string();
        match ctx.content_type.as_deref().and_then(extension_for) {
            Some(ext) => format!("{id}.{ext}"),
            None => id,
        }
    }
}

// Types that say nothing about the content
const OPAQUE_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/x-octet-stream",
    "binary/octet-stream",
    "application/binary",
    "application/unknown",
];

fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim();
    if OPAQUE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(essence)) {
        return None;
    }
    let subtype = essence.rsplit('/').next()?;
    let extensions = mime_guess::get_mime_extensions_str(essence)?;

    extensions
        .iter()
        .find(|ext| ext.eq_ignore_ascii_case(subtype))
        .or_else(|| extensions.first())
        .copied()
}

/// `<uuid>.tmp` names for in-progress files
#[derive(Debug, Clone, Default)]
pub struct TempNamingStrategy;

impl NamingStrategy for TempNamingStrategy {
    fn file_name(&self, _ctx: &UploadContext) -> String {
        format!("{}.tmp", Uuid::new_v4().simple())
    }
}

/// Every file at the root
#[derive(Debug, Clone, Default)]
pub struct FlatStorageStrategy;

impl StorageStrategy for FlatStorageStrategy {
    fn directory(&self, _ctx: &UploadContext, _file_name: &str) -> String {
        String::new()
    }
}

/// `YYYY/MM` directories from the current date
#[derive(Debug, Clone, Default)]
pub struct DatePartitionedStorageStrategy;

impl StorageStrategy for DatePartitionedStorageStrategy {
    fn directory(&self, _ctx: &UploadContext, _file_name: &str) -> String {
        let now = Utc::now();
        format!("{:04}/{:02}", now.year(), now.month())
    }
}
