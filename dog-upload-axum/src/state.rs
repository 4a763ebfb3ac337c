use std::sync::Arc;

use dog_upload::{FormBinder, UploadHandler};

/// Shared by every upload route
pub struct UploadAxumState {
    pub uploads: Arc<UploadHandler>,
    pub form: Option<Arc<dyn FormBinder>>,
}

impl Clone for UploadAxumState {
    fn clone(&self) -> Self {
        Self {
            uploads: Arc::clone(&self.uploads),
            form: self.form.clone(),
        }
    }
}

impl UploadAxumState {
    pub fn new(uploads: Arc<UploadHandler>) -> Self {
        Self {
            uploads,
            form: None,
        }
    }

    /// Bind form data of every upload through `form`
    pub fn with_form(mut self, form: Arc<dyn FormBinder>) -> Self {
        self.form = Some(form);
        self
    }
}
