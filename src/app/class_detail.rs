//! Class detail screen: folders, their files, and the dialogs around them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{class_title, BusyFlag, Route};
use crate::backend::{Backend, Subscription};
use crate::classroom::{ClassRecord, FileRecord, Folder, UploadInput};
use crate::datetime::format_timestamp_default;
use crate::ClassdropError;

/// Name used when the picker supplies none.
const DEFAULT_UPLOAD_NAME: &str = "file";

/// What a rename or delete targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Folder,
    File,
}

/// An open rename dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameState {
    pub kind: ItemKind,
    pub id: String,
    /// The name as currently typed.
    pub value: String,
}

/// A delete waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub kind: ItemKind,
    pub id: String,
    pub name: String,
}

impl PendingDelete {
    /// Confirmation question to show.
    pub fn prompt(&self) -> String {
        match self.kind {
            ItemKind::Folder => format!("Delete folder \"{}\" and its files?", self.name),
            ItemKind::File => format!("Delete file \"{}\"?", self.name),
        }
    }
}

/// A folder with the files filed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderView {
    pub folder: Folder,
    pub files: Vec<FileRecord>,
    pub expanded: bool,
}

enum Update {
    Class(Option<ClassRecord>),
    Files(Vec<FileRecord>),
}

/// State for one class.
#[derive(Debug)]
pub struct ClassDetailScreen {
    backend: Backend,
    code: String,
    timezone: String,
    class: Option<ClassRecord>,
    files: Vec<FileRecord>,
    notice: Option<String>,
    folder_dialog: Option<String>,
    busy: BusyFlag,
    rename: Option<RenameState>,
    pending_delete: Option<PendingDelete>,
    expanded: HashSet<String>,
    share_code_visible: bool,
    last_refresh: DateTime<Utc>,
    class_subscription: Option<Subscription<Option<ClassRecord>>>,
    files_subscription: Option<Subscription<Vec<FileRecord>>>,
}

impl ClassDetailScreen {
    /// Timestamps are shown in the backend's configured timezone.
    pub fn new(backend: Backend, code: impl Into<String>) -> Self {
        let timezone = backend.timezone().to_string();
        Self {
            backend,
            code: code.into(),
            timezone,
            class: None,
            files: Vec::new(),
            notice: None,
            folder_dialog: None,
            busy: BusyFlag::new(),
            rename: None,
            pending_delete: None,
            expanded: HashSet::new(),
            share_code_visible: false,
            last_refresh: Utc::now(),
            class_subscription: None,
            files_subscription: None,
        }
    }

    /// Override the timezone used for displayed timestamps.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Start watching the class and its files. Mounting twice is a no-op.
    pub fn mount(&mut self) {
        if self.is_mounted() {
            return;
        }
        self.class_subscription = Some(self.backend.classes().watch(&self.code));
        self.files_subscription = Some(self.backend.files().watch_by_class(&self.code));
        debug!(code = %self.code, "class detail mounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.class_subscription.is_some() && self.files_subscription.is_some()
    }

    /// Wait for a snapshot from either subscription and apply it.
    ///
    /// Returns `false` if the screen isn't mounted or both subscriptions ended.
    pub async fn next_update(&mut self) -> bool {
        let (Some(class_sub), Some(files_sub)) = (
            self.class_subscription.as_mut(),
            self.files_subscription.as_mut(),
        ) else {
            return false;
        };

        let update = tokio::select! {
            Some(class) = class_sub.next() => Update::Class(class),
            Some(files) = files_sub.next() => Update::Files(files),
            else => return false,
        };

        match update {
            Update::Class(class) => self.class = class,
            Update::Files(files) => self.files = files,
        }
        true
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn title(&self) -> String {
        class_title(&self.code)
    }

    pub fn subtitle(&self) -> String {
        format!(
            "Last updated: {}",
            format_timestamp_default(&self.last_refresh, &self.timezone)
        )
    }

    pub fn class(&self) -> Option<&ClassRecord> {
        self.class.as_ref()
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn folders(&self) -> &[Folder] {
        self.class
            .as_ref()
            .map(|c| c.folders.as_slice())
            .unwrap_or_default()
    }

    // Folder dialog

    pub fn open_folder_dialog(&mut self) {
        self.folder_dialog = Some(String::new());
    }

    pub fn edit_folder_name(&mut self, name: &str) {
        if let Some(value) = self.folder_dialog.as_mut() {
            *value = name.to_string();
        }
    }

    pub fn close_folder_dialog(&mut self) {
        self.folder_dialog = None;
    }

    pub fn folder_dialog(&self) -> Option<&str> {
        self.folder_dialog.as_deref()
    }

    /// Create a folder from the dialog. A blank name is ignored.
    pub async fn create_folder(&mut self) -> Option<Folder> {
        let name = self
            .folder_dialog
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        if name.is_empty() {
            return None;
        }

        let result = {
            let _busy = self.busy.hold();
            self.backend.classes().add_folder(&self.code, &name).await
        };

        match result {
            Ok(folder) => {
                self.folder_dialog = None;
                Some(folder)
            }
            Err(e) => {
                self.notice = Some(e.to_string());
                None
            }
        }
    }

    // Uploads

    /// Upload a picked file into a folder.
    pub async fn upload(
        &mut self,
        folder_id: &str,
        mut input: UploadInput,
    ) -> Option<FileRecord> {
        if input.name.trim().is_empty() {
            input.name = DEFAULT_UPLOAD_NAME.to_string();
        }

        let result = {
            let _busy = self.busy.hold();
            self.backend
                .files()
                .upload(&self.code, folder_id, &input)
                .await
        };

        match result {
            Ok(record) => {
                self.notice = Some("File uploaded".to_string());
                Some(record)
            }
            Err(e) => {
                self.notice = Some(format!("Upload failed: {e}"));
                None
            }
        }
    }

    // Deletes

    /// Ask for confirmation before deleting a folder.
    pub fn request_delete_folder(&mut self, folder_id: &str) -> bool {
        let Some(folder) = self.class.as_ref().and_then(|c| c.folder(folder_id)) else {
            return false;
        };
        self.pending_delete = Some(PendingDelete {
            kind: ItemKind::Folder,
            id: folder.id.clone(),
            name: folder.name.clone(),
        });
        true
    }

    /// Ask for confirmation before deleting a file.
    pub fn request_delete_file(&mut self, file_id: &str) -> bool {
        let Some(file) = self.files.iter().find(|f| f.id == file_id) else {
            return false;
        };
        self.pending_delete = Some(PendingDelete {
            kind: ItemKind::File,
            id: file.id.clone(),
            name: file.name.clone(),
        });
        true
    }

    pub fn pending_delete(&self) -> Option<&PendingDelete> {
        self.pending_delete.as_ref()
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Carry out the pending delete. Returns whether it succeeded.
    ///
    /// A file that is already gone is reported as not found.
    pub async fn confirm_delete(&mut self) -> bool {
        let Some(pending) = self.pending_delete.take() else {
            return false;
        };

        let busy = self.busy.hold();
        let result = match pending.kind {
            ItemKind::Folder => self
                .backend
                .classes()
                .remove_folder(&self.code, &pending.id)
                .await
                .map(|_| "Folder deleted"),
            ItemKind::File => match self.backend.files().delete(&pending.id).await {
                Ok(true) => Ok("File deleted"),
                Ok(false) => Err(ClassdropError::NotFound(format!("file {}", pending.name))),
                Err(e) => Err(e),
            },
        };
        drop(busy);

        match result {
            Ok(message) => {
                if pending.kind == ItemKind::Folder {
                    self.expanded.remove(&pending.id);
                }
                self.notice = Some(message.to_string());
                true
            }
            Err(e) => {
                self.notice = Some(e.to_string());
                false
            }
        }
    }

    // Renames

    /// Open the rename dialog for a folder, prefilled with its name.
    pub fn begin_rename_folder(&mut self, folder_id: &str) -> bool {
        let Some(folder) = self.class.as_ref().and_then(|c| c.folder(folder_id)) else {
            return false;
        };
        self.rename = Some(RenameState {
            kind: ItemKind::Folder,
            id: folder.id.clone(),
            value: folder.name.clone(),
        });
        true
    }

    /// Open the rename dialog for a file, prefilled with its name.
    pub fn begin_rename_file(&mut self, file_id: &str) -> bool {
        let Some(file) = self.files.iter().find(|f| f.id == file_id) else {
            return false;
        };
        self.rename = Some(RenameState {
            kind: ItemKind::File,
            id: file.id.clone(),
            value: file.name.clone(),
        });
        true
    }

    pub fn edit_rename(&mut self, value: &str) {
        if let Some(rename) = self.rename.as_mut() {
            rename.value = value.to_string();
        }
    }

    pub fn cancel_rename(&mut self) {
        self.rename = None;
    }

    pub fn rename_state(&self) -> Option<&RenameState> {
        self.rename.as_ref()
    }

    /// Save the rename. The dialog stays open if it fails.
    pub async fn commit_rename(&mut self) -> bool {
        let Some(rename) = self.rename.clone() else {
            return false;
        };

        let busy = self.busy.hold();
        let result = match rename.kind {
            ItemKind::Folder => {
                self.backend
                    .classes()
                    .rename_folder(&self.code, &rename.id, &rename.value)
                    .await
            }
            ItemKind::File => self.backend.files().rename(&rename.id, &rename.value).await,
        };
        drop(busy);

        match result {
            Ok(()) => {
                self.rename = None;
                true
            }
            Err(e) => {
                self.notice = Some(format!("Rename failed: {e}"));
                false
            }
        }
    }

    // Folder list

    pub fn toggle_folder(&mut self, folder_id: &str) {
        if !self.expanded.remove(folder_id) {
            self.expanded.insert(folder_id.to_string());
        }
    }

    pub fn is_expanded(&self, folder_id: &str) -> bool {
        self.expanded.contains(folder_id)
    }

    /// Folders in order, each with its files in upload order.
    pub fn folder_views(&self) -> Vec<FolderView> {
        self.folders()
            .iter()
            .map(|folder| FolderView {
                folder: folder.clone(),
                files: self
                    .files
                    .iter()
                    .filter(|f| f.folder_id == folder.id)
                    .cloned()
                    .collect(),
                expanded: self.is_expanded(&folder.id),
            })
            .collect()
    }

    /// Files whose folder no longer exists in the class.
    pub fn orphaned_files(&self) -> Vec<&FileRecord> {
        let folders = self.folders();
        self.files
            .iter()
            .filter(|f| !folders.iter().any(|folder| folder.id == f.folder_id))
            .collect()
    }

    /// Secondary line for a file row.
    pub fn file_subtitle(&self, file: &FileRecord) -> String {
        format_timestamp_default(&file.uploaded_at, &self.timezone)
    }

    // Share code

    pub fn show_share_code(&mut self) {
        self.share_code_visible = true;
    }

    pub fn hide_share_code(&mut self) {
        self.share_code_visible = false;
    }

    pub fn is_share_code_visible(&self) -> bool {
        self.share_code_visible
    }

    /// Mark the data as refreshed. The subscriptions are already live.
    pub fn refresh(&mut self) {
        self.last_refresh = Utc::now();
        self.notice = Some("Class data refreshed!".to_string());
    }

    pub fn last_refresh(&self) -> DateTime<Utc> {
        self.last_refresh
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_set()
    }

    /// A handle that observes the busy flag while an action runs.
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Leave the screen.
    pub fn back(&mut self) -> Route {
        self.unmount();
        Route::ClassList
    }

    /// Stop both subscriptions.
    pub fn unmount(&mut self) {
        let had_class = self.class_subscription.take().is_some();
        let had_files = self.files_subscription.take().is_some();
        if had_class || had_files {
            debug!(code = %self.code, "class detail unmounted");
        }
    }
}
