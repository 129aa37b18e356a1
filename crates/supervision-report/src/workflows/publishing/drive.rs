use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use google_drive3::hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use google_drive3::hyper_util::client::legacy::connect::HttpConnector;
use google_drive3::hyper_util::client::legacy::Client;
use google_drive3::hyper_util::rt::TokioExecutor;
use google_drive3::{api::File, api::FileList, api::Scope, yup_oauth2, DriveHub};
use tokio::runtime::Runtime;
use tracing::info;

use crate::workflows::supervision::artifacts;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const LIST_PAGE_SIZE: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedFile {
    pub file_id: String,
    pub name: String,
    pub folder_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync operation failed: {0}")]
    Backend(String),
    #[error("sync runtime unavailable: {0}")]
    Runtime(String),
    #[error("sync i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("path has no file name: {0}")]
    InvalidPath(PathBuf),
}

/// Mirrors local artifacts into a cloud folder.
pub trait CloudSync: Debug {
    fn mirror(&self, local_path: &Path, folder_id: &str) -> Result<SyncedFile, SyncError>;

    /// Moves every file in `source_folder_id` except `keep_name` into
    /// `archive_folder_id`. Returns the moved file names.
    fn archive_folder(
        &self,
        source_folder_id: &str,
        archive_folder_id: &str,
        keep_name: Option<&str>,
    ) -> Result<Vec<String>, SyncError>;
}

fn file_name(path: &Path) -> Result<String, SyncError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| SyncError::InvalidPath(path.to_path_buf()))
}

/// Follows `next_page_token` until the listing is exhausted.
fn collect_pages<F>(mut fetch: F) -> Result<Vec<File>, SyncError>
where
    F: FnMut(Option<String>) -> Result<FileList, SyncError>,
{
    let mut files = Vec::new();
    let mut page_token = None;
    loop {
        let page = fetch(page_token.take())?;
        files.extend(page.files.unwrap_or_default());
        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => return Ok(files),
        }
    }
}

fn mime_for(path: &Path) -> mime::Mime {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => mime::TEXT_CSV,
        Some("xlsx") => XLSX_MIME
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Wraps the generated google-drive3 client so the synchronous pipeline can
/// talk to Drive without exposing async details.
pub struct GoogleDriveSync<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    hub: DriveHub<C>,
    runtime: Runtime,
}

impl<C> GoogleDriveSync<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    pub fn new(hub: DriveHub<C>, runtime: Runtime) -> Self {
        Self { hub, runtime }
    }

    fn map_error<E: std::fmt::Display>(err: E) -> SyncError {
        SyncError::Backend(err.to_string())
    }
}

impl GoogleDriveSync<HttpsConnector<HttpConnector>> {
    /// Authenticates with a service-account key file.
    pub fn from_service_account_key(key_path: &Path) -> Result<Self, SyncError> {
        let runtime = Runtime::new().map_err(|err| SyncError::Runtime(err.to_string()))?;
        let auth = runtime.block_on(async {
            let key = yup_oauth2::read_service_account_key(key_path).await?;
            yup_oauth2::ServiceAccountAuthenticator::builder(key)
                .build()
                .await
        });
        let auth = auth.map_err(Self::map_error)?;

        let connector = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(Self::map_error)?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self::new(DriveHub::new(client, auth), runtime))
    }
}

impl<C> Debug for GoogleDriveSync<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDriveSync").finish_non_exhaustive()
    }
}

impl<C> CloudSync for GoogleDriveSync<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn mirror(&self, local_path: &Path, folder_id: &str) -> Result<SyncedFile, SyncError> {
        let name = file_name(local_path)?;
        let metadata = File {
            name: Some(name.clone()),
            parents: Some(vec![folder_id.to_string()]),
            ..File::default()
        };
        let content = fs::File::open(local_path)?;
        let mime_type = mime_for(local_path);

        let result = self.runtime.block_on(async {
            self.hub
                .files()
                .create(metadata)
                .param("fields", "id,name")
                .supports_all_drives(true)
                .add_scope(Scope::Full)
                .upload(content, mime_type)
                .await
        });

        let (_, file) = result.map_err(Self::map_error)?;
        let synced = SyncedFile {
            file_id: file.id.unwrap_or_default(),
            name: file.name.unwrap_or(name),
            folder_id: folder_id.to_string(),
        };
        info!(file = %synced.name, folder = folder_id, "uploaded to drive");
        Ok(synced)
    }

    fn archive_folder(
        &self,
        source_folder_id: &str,
        archive_folder_id: &str,
        keep_name: Option<&str>,
    ) -> Result<Vec<String>, SyncError> {
        let query = format!(
            "'{source_folder_id}' in parents and trashed=false and mimeType != 'application/vnd.google-apps.folder'"
        );
        let files = collect_pages(|page_token| {
            let listed = self.runtime.block_on(async {
                let mut call = self
                    .hub
                    .files()
                    .list()
                    .q(&query)
                    .param("fields", "nextPageToken,files(id,name)")
                    .page_size(LIST_PAGE_SIZE)
                    .include_items_from_all_drives(true)
                    .supports_all_drives(true)
                    .add_scope(Scope::Full);
                if let Some(token) = page_token {
                    call = call.page_token(&token);
                }
                call.doit().await
            });
            let (_, file_list) = listed.map_err(Self::map_error)?;
            Ok(file_list)
        })?;

        let mut moved = Vec::new();
        for file in files {
            let (Some(id), Some(name)) = (file.id, file.name) else {
                continue;
            };
            if keep_name == Some(name.as_str()) {
                continue;
            }

            let result = self.runtime.block_on(async {
                self.hub
                    .files()
                    .update(File::default(), &id)
                    .add_parents(archive_folder_id)
                    .remove_parents(source_folder_id)
                    .supports_all_drives(true)
                    .add_scope(Scope::Full)
                    .doit_without_upload()
                    .await
            });
            result.map_err(Self::map_error)?;
            info!(file = %name, archive = archive_folder_id, "archived drive file");
            moved.push(name);
        }

        Ok(moved)
    }
}

/// Copies artifacts into a desktop-synced directory; a folder id names a
/// subdirectory of the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFolderSync {
    root: PathBuf,
}

impl LocalFolderSync {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn folder(&self, folder_id: &str) -> PathBuf {
        self.root.join(folder_id)
    }
}

impl CloudSync for LocalFolderSync {
    fn mirror(&self, local_path: &Path, folder_id: &str) -> Result<SyncedFile, SyncError> {
        let name = file_name(local_path)?;
        let folder = self.folder(folder_id);
        fs::create_dir_all(&folder)?;

        let target = folder.join(&name);
        let partial = artifacts::partial_path(&target);
        fs::copy(local_path, &partial)?;
        artifacts::promote(&partial, &target)?;

        info!(file = %name, folder = %folder.display(), "mirrored to sync folder");
        Ok(SyncedFile {
            file_id: target.display().to_string(),
            name,
            folder_id: folder_id.to_string(),
        })
    }

    fn archive_folder(
        &self,
        source_folder_id: &str,
        archive_folder_id: &str,
        keep_name: Option<&str>,
    ) -> Result<Vec<String>, SyncError> {
        let source = self.folder(source_folder_id);
        if !source.is_dir() {
            return Ok(Vec::new());
        }
        let archive = self.folder(archive_folder_id);

        let mut entries = Vec::new();
        for entry in fs::read_dir(&source)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep_name == Some(name.as_str()) || name.ends_with(".partial") {
                continue;
            }
            entries.push((name, entry.path()));
        }
        entries.sort();

        for (name, _) in &entries {
            let target = archive.join(name);
            if target.exists() {
                return Err(SyncError::Backend(format!(
                    "archive already holds {}",
                    target.display()
                )));
            }
        }

        if !entries.is_empty() {
            fs::create_dir_all(&archive)?;
        }
        let mut moved = Vec::new();
        for (name, path) in entries {
            fs::rename(&path, archive.join(&name))?;
            info!(file = %name, archive = %archive.display(), "archived synced file");
            moved.push(name);
        }
        Ok(moved)
    }
}
