//! Scripted in-memory portal implementing `PageSession`/`PageElement`.
//!
//! Pages are keyed by URL. Unknown URLs render as blank pages; URLs marked as
//! failing return a navigation error. Clicking a dataset's download trigger
//! reveals its request form; a submit the portal accepts writes the dataset's
//! file into whatever directory the session was told to download into.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::{
    Locator, PageElement, PageSession, PortalLayout, RecognizeError, RenderError, TextRecognizer,
};

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-captcha";

/// Gated download behind a dataset's "Download" control.
#[derive(Debug, Clone)]
pub struct FakeDownload {
    /// `false` models a trigger that never opens a form.
    pub has_form: bool,
    pub radio_values: Vec<String>,
    pub file_name: String,
    pub contents: Vec<u8>,
    /// 1-based submit that gets accepted; `None` rejects every submit.
    pub accept_on_submit: Option<usize>,
}

impl FakeDownload {
    pub fn file(name: &str, contents: &[u8]) -> Self {
        Self {
            has_form: true,
            radio_values: vec!["commercial".to_string(), "non-commercial".to_string()],
            file_name: name.to_string(),
            contents: contents.to_vec(),
            accept_on_submit: Some(1),
        }
    }

    pub fn without_form() -> Self {
        Self {
            has_form: false,
            ..Self::file("unused.csv", b"")
        }
    }

    pub fn accepted_on(mut self, submit: Option<usize>) -> Self {
        self.accept_on_submit = submit;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    /// Listing anchors; `None` is an anchor without `href`.
    pub links: Vec<Option<String>>,
    pub title: Option<String>,
    pub metadata: Option<String>,
    pub download: Option<FakeDownload>,
}

impl FakePage {
    pub fn listing<I, S>(links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            links: links.into_iter().map(|l| Some(l.into())).collect(),
            ..Self::default()
        }
    }

    pub fn dataset(title: &str, metadata: Option<&str>, download: Option<FakeDownload>) -> Self {
        Self {
            title: Some(title.to_string()),
            metadata: metadata.map(str::to_string),
            download,
            ..Self::default()
        }
    }
}

/// What the session observed; inspected by tests.
#[derive(Debug, Default)]
pub struct PortalLog {
    pub navigations: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub cleared: Vec<String>,
    pub selected_radio: Option<String>,
    pub submits: usize,
    pub download_dirs: Vec<PathBuf>,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct PortalState {
    pages: HashMap<String, FakePage>,
    failing: HashSet<String>,
    current: Option<String>,
    form_open: bool,
    accepted: bool,
    submits_on_page: usize,
    download_dir: Option<PathBuf>,
    log: PortalLog,
}

impl PortalState {
    fn page(&self) -> Option<&FakePage> {
        self.current.as_ref().and_then(|url| self.pages.get(url))
    }

    fn download(&self) -> Option<&FakeDownload> {
        self.page().and_then(|page| page.download.as_ref())
    }

    fn form_visible(&self) -> bool {
        self.form_open && !self.accepted && self.download().is_some_and(|d| d.has_form)
    }
}

/// Handle shared by the session under test and the test body.
#[derive(Clone, Default)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, page: FakePage) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), page);
        self
    }

    pub fn failing(self, url: &str) -> Self {
        self.state.lock().unwrap().failing.insert(url.to_string());
        self
    }

    pub fn session(&self) -> Box<dyn PageSession> {
        Box::new(FakeSession {
            state: Arc::clone(&self.state),
            layout: PortalLayout::default(),
        })
    }

    pub fn with_log<R>(&self, f: impl FnOnce(&PortalLog) -> R) -> R {
        f(&self.state.lock().unwrap().log)
    }
}

struct FakeSession {
    state: Arc<Mutex<PortalState>>,
    layout: PortalLayout,
}

#[derive(Debug, Clone)]
enum Kind {
    Link(Option<String>),
    Title(String),
    Metadata(String),
    Trigger,
    Field(String),
    Radio(String),
    CaptchaImage,
    CaptchaInput,
    Submit,
}

struct FakeElement {
    state: Arc<Mutex<PortalState>>,
    kind: Kind,
}

impl FakeSession {
    fn kinds(&self, locator: &Locator) -> Vec<Kind> {
        let state = self.state.lock().unwrap();
        let Some(page) = state.page() else {
            return Vec::new();
        };
        let layout = &self.layout;
        let form = state.form_visible();

        if *locator == layout.listing_link {
            page.links.iter().cloned().map(Kind::Link).collect()
        } else if *locator == layout.title {
            page.title.iter().cloned().map(Kind::Title).collect()
        } else if *locator == layout.metadata_panel {
            page.metadata.iter().cloned().map(Kind::Metadata).collect()
        } else if *locator == layout.download_trigger {
            page.download.iter().map(|_| Kind::Trigger).collect()
        } else if !form {
            Vec::new()
        } else if let Locator::Name(name) = locator
            && [&layout.name_field, &layout.email_field, &layout.purpose_field].contains(&locator)
        {
            vec![Kind::Field(name.clone())]
        } else if *locator == layout.usage_radio {
            state
                .download()
                .map(|d| d.radio_values.iter().cloned().map(Kind::Radio).collect())
                .unwrap_or_default()
        } else if *locator == layout.captcha_image {
            vec![Kind::CaptchaImage]
        } else if *locator == layout.captcha_input {
            vec![Kind::CaptchaInput]
        } else if *locator == layout.submit {
            vec![Kind::Submit]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), RenderError> {
        let mut state = self.state.lock().unwrap();
        state.log.navigations.push(url.to_string());
        if state.failing.contains(url) {
            state.current = None;
            return Err(RenderError::navigation(url, "net::ERR_CONNECTION_RESET"));
        }
        state.current = Some(url.to_string());
        state.form_open = false;
        state.accepted = false;
        state.submits_on_page = 0;
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Box<dyn PageElement>>, RenderError> {
        Ok(self
            .kinds(locator)
            .into_iter()
            .map(|kind| {
                Box::new(FakeElement {
                    state: Arc::clone(&self.state),
                    kind,
                }) as Box<dyn PageElement>
            })
            .collect())
    }

    async fn set_download_dir(&mut self, dir: &Path) -> Result<(), RenderError> {
        let mut state = self.state.lock().unwrap();
        state.download_dir = Some(dir.to_path_buf());
        state.log.download_dirs.push(dir.to_path_buf());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        self.state.lock().unwrap().log.closed = true;
        Ok(())
    }
}

#[async_trait]
impl PageElement for FakeElement {
    async fn text(&self) -> Result<String, RenderError> {
        Ok(match &self.kind {
            Kind::Title(text) | Kind::Metadata(text) => text.clone(),
            Kind::Trigger | Kind::Submit => "Download".to_string(),
            _ => String::new(),
        })
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, RenderError> {
        Ok(match (&self.kind, name) {
            (Kind::Link(href), "href") => href.clone(),
            (Kind::Radio(value), "value") => Some(value.clone()),
            _ => None,
        })
    }

    async fn click(&self) -> Result<(), RenderError> {
        let mut state = self.state.lock().unwrap();
        match &self.kind {
            Kind::Trigger => state.form_open = true,
            Kind::Radio(value) => state.log.selected_radio = Some(value.clone()),
            Kind::Submit => {
                state.log.submits += 1;
                state.submits_on_page += 1;
                let submit = state.submits_on_page;
                let download = state.download().cloned();
                if let Some(download) = download
                    && download.accept_on_submit == Some(submit)
                {
                    state.accepted = true;
                    if let Some(dir) = &state.download_dir {
                        std::fs::write(dir.join(&download.file_name), &download.contents)
                            .map_err(|e| RenderError::command("download", e))?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), RenderError> {
        let key = match &self.kind {
            Kind::Field(name) => name.clone(),
            Kind::CaptchaInput => "captcha".to_string(),
            _ => return Err(RenderError::command("type", "element is not an input")),
        };
        self.state
            .lock()
            .unwrap()
            .log
            .typed
            .push((key, text.to_string()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), RenderError> {
        if let Kind::Field(name) = &self.kind {
            self.state.lock().unwrap().log.cleared.push(name.clone());
        } else if matches!(self.kind, Kind::CaptchaInput) {
            self.state
                .lock()
                .unwrap()
                .log
                .cleared
                .push("captcha".to_string());
        }
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, RenderError> {
        match self.kind {
            Kind::CaptchaImage => Ok(PNG_BYTES.to_vec()),
            _ => Err(RenderError::command("screenshot", "element has no box")),
        }
    }
}

/// Recognizer returning a fixed guess and counting calls.
pub struct FakeRecognizer {
    guess: Option<String>,
    calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn returning(guess: &str) -> Arc<Self> {
        Arc::new(Self {
            guess: Some(guess.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always fails as if tesseract were missing.
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            guess: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(&self, image_png: &[u8]) -> Result<String, RecognizeError> {
        assert_eq!(image_png, PNG_BYTES, "recognizer got an unexpected image");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.guess.clone().ok_or(RecognizeError::NotInstalled)
    }
}
