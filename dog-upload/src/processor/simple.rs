use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{bind_form, check_headers, non_empty_body, UploadProcessor};
use crate::filesystem::WriteOptions;
use crate::{FormBinder, Result, StorageHandler, UploadConfig, UploadContext, UploadRequest, UploadResult};

/// Whole file in the request body; form fields in the query string
pub struct SimpleUploadProcessor {
    handler: Arc<StorageHandler>,
    config: Arc<UploadConfig>,
}

impl SimpleUploadProcessor {
    pub fn new(handler: Arc<StorageHandler>, config: Arc<UploadConfig>) -> Self {
        Self { handler, config }
    }

    fn form_data(&self, request: &UploadRequest) -> Value {
        let fields: Map<String, Value> = request
            .head()
            .query
            .iter()
            .filter(|(key, _)| *key != self.config.upload_type_parameter)
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        Value::Object(fields)
    }
}

#[async_trait]
impl UploadProcessor for SimpleUploadProcessor {
    #[instrument(skip_all, fields(upload_type = "simple", path = %request.head().path))]
    async fn handle_upload(
        &self,
        request: &mut UploadRequest,
        form: Option<&dyn FormBinder>,
    ) -> Result<UploadResult> {
        check_headers(request, &["Content-Type"])?;
        let content_type = request.header("Content-Type").unwrap_or_default().to_string();

        let form_data = match bind_form(form, self.form_data(request)) {
            Ok(data) => data,
            Err(errors) => return Ok(UploadResult::from_form_errors(errors)),
        };

        let body = non_empty_body(request).await?;

        let mut ctx = UploadContext::new(request.head().clone(), self.config.clone())
            .with_content_type(content_type.clone())
            .unfinished(true);
        let options = WriteOptions::new().with_content_type(content_type);

        ctx.file = Some(self.handler.store_stream(&ctx, body, &options, false).await?);
        let file = self.handler.finish_store(&mut ctx).await?;

        info!(path = %file.path(), size = file.size(), "simple upload stored");

        Ok(UploadResult {
            file: Some(file),
            form_data: Some(form_data),
            ..UploadResult::default()
        })
    }
}
