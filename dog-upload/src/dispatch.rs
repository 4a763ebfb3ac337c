use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::processor::{
    MultipartUploadProcessor, ResumableUploadProcessor, SimpleUploadProcessor, UploadProcessor,
};
use crate::{
    FormBinder, Result, StorageHandler, UploadConfig, UploadError, UploadRequest, UploadResult,
    UploadSessionStore,
};

/// Routes requests to the processor registered for their upload type
pub struct UploadHandler {
    config: Arc<UploadConfig>,
    processors: HashMap<String, Arc<dyn UploadProcessor>>,
}

impl UploadHandler {
    pub fn new(config: Arc<UploadConfig>) -> Self {
        Self {
            config,
            processors: HashMap::new(),
        }
    }

    /// Handler with `simple`, `multipart` and `resumable` registered
    pub fn with_default_processors(
        config: Arc<UploadConfig>,
        storage: Arc<StorageHandler>,
        sessions: Arc<dyn UploadSessionStore>,
    ) -> Self {
        let mut processors: HashMap<String, Arc<dyn UploadProcessor>> = HashMap::new();
        processors.insert(
            "simple".to_string(),
            Arc::new(SimpleUploadProcessor::new(storage.clone(), config.clone())),
        );
        processors.insert(
            "multipart".to_string(),
            Arc::new(MultipartUploadProcessor::new(storage.clone(), config.clone())),
        );
        processors.insert(
            "resumable".to_string(),
            Arc::new(ResumableUploadProcessor::new(storage, sessions, config.clone())),
        );

        Self { config, processors }
    }

    pub fn config(&self) -> &Arc<UploadConfig> {
        &self.config
    }

    /// Register a processor; each upload type has at most one
    pub fn register<S, P>(&mut self, upload_type: S, processor: P) -> Result<()>
    where
        S: Into<String>,
        P: UploadProcessor + 'static,
    {
        let upload_type = upload_type.into();
        if self.processors.contains_key(&upload_type) {
            return Err(UploadError::DuplicateProcessor { upload_type });
        }
        self.processors.insert(upload_type, Arc::new(processor));
        Ok(())
    }

    pub fn processor(&self, upload_type: &str) -> Option<&Arc<dyn UploadProcessor>> {
        self.processors.get(upload_type)
    }

    /// Handle a request; errors are captured in the result, never returned
    pub async fn handle_request(
        &self,
        request: &mut UploadRequest,
        form: Option<&dyn FormBinder>,
    ) -> UploadResult {
        let upload_type = request.query_param(&self.config.upload_type_parameter);

        let processor = match upload_type.and_then(|t| self.processors.get(t)) {
            Some(processor) => processor.clone(),
            None => {
                return UploadResult::from_error(UploadError::UnknownUploadType {
                    upload_type: upload_type.map(str::to_string),
                })
            }
        };

        match processor.handle_upload(request, form).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_configuration() || e.status_code() >= 500 {
                    tracing::error!(error = %e, "upload failed");
                } else {
                    warn!(error = %e, "upload rejected");
                }
                UploadResult::from_error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryUploadSessionStore, StorageVoter};
    use async_trait::async_trait;
    use http::Method;

    struct Echo;

    #[async_trait]
    impl UploadProcessor for Echo {
        async fn handle_upload(
            &self,
            _request: &mut UploadRequest,
            _form: Option<&dyn FormBinder>,
        ) -> Result<UploadResult> {
            Err(UploadError::EmptyContent)
        }
    }

    fn handler() -> UploadHandler {
        UploadHandler::with_default_processors(
            Arc::new(UploadConfig::default()),
            Arc::new(StorageHandler::new(StorageVoter::new())),
            Arc::new(MemoryUploadSessionStore::new()),
        )
    }

    #[test]
    fn duplicate_processors_are_rejected() {
        let mut handler = handler();
        assert!(matches!(
            handler.register("simple", Echo),
            Err(UploadError::DuplicateProcessor { upload_type }) if upload_type == "simple"
        ));
        handler.register("echo", Echo).unwrap();
        assert!(handler.processor("echo").is_some());
    }

    #[tokio::test]
    async fn unknown_upload_type_is_captured() {
        let handler = handler();
        let mut request = UploadRequest::new(Method::POST, "/upload").with_query("uploadType", "ftp");

        let result = handler.handle_request(&mut request, None).await;
        assert!(matches!(
            result.error,
            Some(UploadError::UnknownUploadType { upload_type: Some(ref t) }) if t == "ftp"
        ));

        let response = result.into_response();
        assert_eq!(response.status, 400);
        let body = response.body.unwrap();
        assert_eq!(
            body["errors"]["_schema"][0],
            "Unknown upload processor for upload type ftp"
        );
    }

    #[tokio::test]
    async fn processor_errors_become_results() {
        let mut handler = handler();
        handler.register("echo", Echo).unwrap();
        let mut request = UploadRequest::new(Method::POST, "/upload").with_query("uploadType", "echo");

        let result = handler.handle_request(&mut request, None).await;
        assert!(!result.is_success());
        assert!(matches!(result.error, Some(UploadError::EmptyContent)));
    }

    #[tokio::test]
    async fn missing_storage_is_a_server_error() {
        let handler = handler();
        let mut request = UploadRequest::new(Method::POST, "/upload")
            .with_query("uploadType", "simple")
            .with_header("Content-Type", "text/plain")
            .with_bytes("hello");

        let response = handler.handle_request(&mut request, None).await.into_response();
        assert_eq!(response.status, 500);
    }
}
