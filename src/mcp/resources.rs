//! Static resources exposed through `resources/list` and `resources/read`.

use serde::Serialize;

use crate::tools::builtin::describe_directory;

/// URI of the working-directory listing resource.
pub const CURRENT_DIRECTORY_URI: &str = "file://current_directory";

/// A resource entry for resources/list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Resource URI.
    pub uri: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// MIME type of the contents.
    pub mime_type: &'static str,
}

/// Contents returned by resources/read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// Resource URI.
    pub uri: String,
    /// MIME type of `text`.
    pub mime_type: &'static str,
    /// The resource body.
    pub text: String,
}

/// All resources this server offers.
#[must_use]
pub fn list_resources() -> Vec<Resource> {
    vec![Resource {
        uri: CURRENT_DIRECTORY_URI,
        name: "Current Directory",
        description: "Contents of the current working directory",
        mime_type: "text/plain",
    }]
}

/// Reads a resource by URI.
///
/// Returns `None` for unknown URIs. Failures while reading a known resource
/// are reported inside the returned text.
#[must_use]
pub fn read_resource(uri: &str) -> Option<ResourceContents> {
    match uri {
        CURRENT_DIRECTORY_URI => Some(ResourceContents {
            uri: uri.to_string(),
            mime_type: "text/plain",
            text: current_directory_listing(),
        }),
        _ => None,
    }
}

fn current_directory_listing() -> String {
    let listing = std::env::current_dir().and_then(|cwd| {
        describe_directory(&cwd).map(|entries| (cwd.display().to_string(), entries))
    });
    match listing {
        Ok((cwd, entries)) => format!("Current working directory: {cwd}\n\n{entries}"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list current directory");
            format!("Error accessing current directory: {}", e.kind())
        }
    }
}
