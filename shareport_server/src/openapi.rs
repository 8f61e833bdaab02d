//! OpenAPI 3.1 specification generation for the Shareport API.
//!
//! Uses utoipa to generate the spec from annotated handlers and types.
//! The spec is served at `/api-doc/openapi.json` and Swagger UI at
//! `/swagger-ui`.

use utoipa::OpenApi;

use crate::error::ApiError;
use crate::handlers;
use crate::types::*;

/// OpenAPI specification for the Shareport API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shareport API",
        description = "Ad-hoc HTTP file sharing — expose filesystem roots as named shares \
                       for listing, download, upload, rename, copy, move, and deletion.",
        version = "0.3.0",
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local server")
    ),
    tags(
        (name = "Index", description = "Share index"),
        (name = "Files", description = "File operations under a share — list, download, upload, delete, mkdir, move, copy")
    ),
    paths(
        handlers::index,
        handlers::list_directory,
        handlers::download,
        handlers::upload_raw,
        handlers::upload_multipart,
        handlers::delete,
        handlers::file_op,
    ),
    components(schemas(
        IndexEntry,
        IndexResponse,
        EntryInfo,
        ListResponse,
        FileOp,
        FileOpRequest,
        OpResponse,
        UploadedFile,
        UploadResponse,
        HealthResponse,
        ApiError,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        let json = spec.to_json().unwrap();
        assert!(json.contains("Shareport API"));
        assert!(json.contains("FileOpRequest"));
    }
}
