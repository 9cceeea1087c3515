//! MCP tool service exposing read-only Google Drive access.

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use drivemcp_common::{FileId, Result as DriveResult};
use drivemcp_drive::{ExportFormatResolver, Resolution, SessionFactory, LIST_FIELDS, METADATA_FIELDS};

use crate::format;

const SEARCH_FIELDS: &str = "id, name, mimeType, createdTime, modifiedTime, size";
const FOLDER_FIELDS: &str = "id, name, createdTime, modifiedTime";
const CONTENT_PROBE_FIELDS: &str = "id,name,mimeType";

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListFilesRequest {
    /// Maximum number of files to return (default: 10)
    #[schemars(description = "Maximum number of files to return (default: 10, max: 1000)")]
    pub max_results: Option<u32>,

    /// Drive query string
    #[schemars(description = "Optional Drive query to filter files, e.g. \"mimeType = 'text/plain'\"")]
    pub query: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchFilesRequest {
    /// Text to look for
    #[schemars(description = "Search text matched against file names and content")]
    pub query: String,

    /// Maximum number of files to return (default: 10)
    #[schemars(description = "Maximum number of files to return (default: 10, max: 1000)")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FileRequest {
    /// Drive file ID
    #[schemars(description = "Google Drive file ID")]
    pub file_id: String,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListFoldersRequest {
    /// Parent folder (default: root)
    #[schemars(description = "ID of the parent folder (default: \"root\")")]
    pub parent_id: Option<String>,

    /// Maximum number of folders to return (default: 10)
    #[schemars(description = "Maximum number of folders to return (default: 10, max: 1000)")]
    pub max_results: Option<u32>,
}

/// Drive MCP service.
#[derive(Clone)]
pub struct DriveToolService {
    sessions: Arc<SessionFactory>,
    tool_router: ToolRouter<Self>,
}

impl DriveToolService {
    /// Create a service; credentials are resolved on the first tool call.
    pub fn new(sessions: Arc<SessionFactory>) -> Self {
        Self {
            sessions,
            tool_router: Self::tool_router(),
        }
    }

    async fn list_files_text(&self, request: ListFilesRequest) -> DriveResult<String> {
        let session = self.sessions.get_session().await?;
        let query = request.query.unwrap_or_default();
        let files = session
            .client()
            .list_files(&query, format::page_size(request.max_results), LIST_FIELDS)
            .await?;
        Ok(format::file_list(&files))
    }

    async fn search_files_text(&self, request: SearchFilesRequest) -> DriveResult<String> {
        let session = self.sessions.get_session().await?;
        let files = session
            .client()
            .list_files(
                &format::search_query(&request.query),
                format::page_size(request.max_results),
                SEARCH_FIELDS,
            )
            .await?;
        Ok(format::search_results(&request.query, &files))
    }

    async fn file_content_text(&self, request: FileRequest) -> DriveResult<String> {
        let file_id = FileId::new(request.file_id)?;
        let session = self.sessions.get_session().await?;
        let file = session.client().get_file(&file_id, CONTENT_PROBE_FIELDS).await?;

        match ExportFormatResolver::resolve(&file.mime_type) {
            Resolution::Supported(plan) => {
                debug!(file_id = %file_id, mode = ?plan.mode, "Retrieving content");
                let text = session
                    .downloader()
                    .fetch_text(session.client(), &file_id, &plan)
                    .await?;
                Ok(format::content(&file.name, plan.representation, &text))
            }
            Resolution::Unsupported { mime_type } => Ok(format::unsupported(&mime_type)),
        }
    }

    async fn file_metadata_text(&self, request: FileRequest) -> DriveResult<String> {
        let file_id = FileId::new(request.file_id)?;
        let session = self.sessions.get_session().await?;
        let file = session.client().get_file(&file_id, METADATA_FIELDS).await?;
        Ok(format::metadata(&file))
    }

    async fn list_folders_text(&self, request: ListFoldersRequest) -> DriveResult<String> {
        let parent = match request.parent_id {
            Some(id) => FileId::new(id)?,
            None => FileId::root(),
        };
        let session = self.sessions.get_session().await?;
        let folders = session
            .client()
            .list_files(
                &format::folders_query(&parent),
                format::page_size(request.max_results),
                FOLDER_FIELDS,
            )
            .await?;

        let parent_name = if parent.is_root() {
            format::ROOT_DISPLAY_NAME.to_string()
        } else {
            session.client().get_file(&parent, "name").await?.name
        };
        Ok(format::folder_list(&parent_name, &folders))
    }
}

/// Turn a tool outcome into a result; failures stay tool-level errors.
fn respond(
    tool: &str,
    outcome: DriveResult<String>,
    context: &str,
) -> Result<CallToolResult, McpError> {
    Ok(match outcome {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => {
            warn!(tool, error = %e, "Tool call failed");
            CallToolResult::error(vec![Content::text(format!("{}: {}", context, e))])
        }
    })
}

#[tool_router]
impl DriveToolService {
    /// List files in Google Drive.
    #[tool(description = "List files in Google Drive, optionally filtered by a Drive query.")]
    pub async fn list_files(
        &self,
        Parameters(request): Parameters<ListFilesRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond("list_files", self.list_files_text(request).await, "Error listing files")
    }

    /// Search by name or content.
    #[tool(description = "Search for files in Google Drive by name or content.")]
    pub async fn search_files(
        &self,
        Parameters(request): Parameters<SearchFilesRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "search_files",
            self.search_files_text(request).await,
            "Error searching files",
        )
    }

    /// Text content of a file.
    #[tool(
        description = "Get the content of a text file, Google Doc (as plain text) or Google Sheet (as CSV) from Google Drive."
    )]
    pub async fn get_file_content(
        &self,
        Parameters(request): Parameters<FileRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "get_file_content",
            self.file_content_text(request).await,
            "Error retrieving file",
        )
    }

    /// Metadata of a file.
    #[tool(description = "Get metadata for a specific file in Google Drive.")]
    pub async fn get_file_metadata(
        &self,
        Parameters(request): Parameters<FileRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "get_file_metadata",
            self.file_metadata_text(request).await,
            "Error retrieving file metadata",
        )
    }

    /// Folders under a parent.
    #[tool(description = "List folders in Google Drive under a parent folder (default: root).")]
    pub async fn list_folders(
        &self,
        Parameters(request): Parameters<ListFoldersRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "list_folders",
            self.list_folders_text(request).await,
            "Error listing folders",
        )
    }
}

#[tool_handler]
impl ServerHandler for DriveToolService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Read-only Google Drive access. Use 'list_files' or 'search_files' to find files, 'list_folders' to browse, 'get_file_metadata' for details and 'get_file_content' to read text files, Google Docs and Google Sheets.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}
