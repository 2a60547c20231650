pub mod drive;
pub mod memory;
pub mod sheets;
pub mod traits;

pub use drive::GoogleDriveClient;
pub use memory::{MemoryFileStore, MemorySheetStore};
pub use sheets::GoogleSheetsClient;
pub use traits::{FileStore, RangeRef, RemoteFolder, RowUpdate, SheetStore, UploadedFile};

use crate::error::StoreError;
use reqwest::Response;

/// Pass a successful response through; turn any other status into [`StoreError::Api`]
/// carrying the response body
pub(crate) async fn checked(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> Response {
        http::Response::builder()
            .status(status)
            .body(body.to_string())
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn error_status_keeps_the_body() {
        let err = checked(response(503, "backend unavailable")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(
            matches!(err, StoreError::Api { status: 503, ref message } if message == "backend unavailable")
        );
    }

    #[tokio::test]
    async fn success_passes_through() {
        let ok = checked(response(200, "{}")).await.unwrap();
        assert_eq!(ok.status(), 200);
    }
}
