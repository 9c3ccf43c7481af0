//! Class list screen.

use tracing::{debug, info};

use super::{class_title, BusyFlag, Route};
use crate::backend::{Backend, Subscription};
use crate::classroom::{normalize_class_code, ClassRecord};
use crate::Result;

/// One row of the class list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRow {
    pub code: String,
    pub title: String,
    pub subtitle: String,
}

impl ClassRow {
    fn from_class(class: &ClassRecord) -> Self {
        let subtitle = match class.folders.len() {
            0 => "No folders yet".to_string(),
            n => format!("{n} folder(s)"),
        };
        Self {
            code: class.code.clone(),
            title: class_title(&class.code),
            subtitle,
        }
    }
}

/// State for the list of all classes.
#[derive(Debug)]
pub struct ClassListScreen {
    backend: Backend,
    classes: Vec<ClassRecord>,
    loading: bool,
    creating: BusyFlag,
    notice: Option<String>,
    subscription: Option<Subscription<Vec<ClassRecord>>>,
}

impl ClassListScreen {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            classes: Vec::new(),
            loading: true,
            creating: BusyFlag::new(),
            notice: None,
            subscription: None,
        }
    }

    /// Start watching classes. Mounting twice keeps the first subscription.
    pub fn mount(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        self.loading = true;
        self.subscription = Some(self.backend.classes().watch_all());
        debug!("class list mounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Wait for the next snapshot and apply it.
    ///
    /// Returns `false` if the screen isn't mounted or the subscription ended.
    pub async fn next_update(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };
        match subscription.next().await {
            Some(classes) => {
                self.classes = classes;
                self.loading = false;
                true
            }
            None => false,
        }
    }

    /// Create a new class and report the outcome as a notice.
    pub async fn create_class(&mut self) -> Option<ClassRecord> {
        let result = {
            let _creating = self.creating.hold();
            self.backend.classes().create().await
        };

        match result {
            Ok(class) => {
                self.notice = Some(format!("Created class {}", class.code));
                Some(class)
            }
            Err(e) => {
                self.notice = Some(e.to_string());
                None
            }
        }
    }

    /// Route to a listed class.
    pub fn open(&self, code: &str) -> Route {
        Route::ClassDetail(code.to_string())
    }

    /// Join a class by a typed-in code.
    ///
    /// The code is normalized and must name an existing class. Failures are
    /// also shown as a notice.
    pub async fn join(&mut self, input: &str) -> Result<Route> {
        let result = self.find_class(input).await;
        match &result {
            Ok(Route::ClassDetail(code)) => info!(code = %code, "joined class"),
            Ok(Route::ClassList) => {}
            Err(e) => self.notice = Some(e.to_string()),
        }
        result
    }

    async fn find_class(&self, input: &str) -> Result<Route> {
        let code = normalize_class_code(input)?;
        self.backend.classes().require(&code).await?;
        Ok(Route::ClassDetail(code))
    }

    /// Rows to display, newest class first.
    pub fn rows(&self) -> Vec<ClassRow> {
        self.classes.iter().map(ClassRow::from_class).collect()
    }

    pub fn classes(&self) -> &[ClassRecord] {
        &self.classes
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_creating(&self) -> bool {
        self.creating.is_set()
    }

    /// A handle that observes the creating flag while `create_class` runs.
    pub fn creating_flag(&self) -> BusyFlag {
        self.creating.clone()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Stop watching classes.
    pub fn unmount(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("class list unmounted");
        }
    }
}
