//! One user's book session: the two-state page and its two request flows.
//!
//! ## States
//!
//! ```text
//! CollectingInput ──submit ok──▶ DisplayingResult
//! ```
//!
//! The transition is one-way. A failed submission leaves the page exactly as
//! it was: form visible, nothing retained.
//!
//! ## Single flight
//!
//! Each flow owns a trigger. Starting a flow disables and relabels its
//! trigger through a [`TriggerLock`]; dropping the lock restores it, on
//! success, on failure and on early return alike. A flow whose trigger is
//! already disabled is refused with [`BookError::InvalidState`].
//!
//! Nothing here is retried. Every failure alerts the user and ends the flow.

use crate::client::api::BookApi;
use crate::client::assemble::{self, DisplayedBook, LastGeneration};
use crate::client::download::DownloadSink;
use crate::client::{
    ATTACHMENT_ALERT, GENERATION_ALERT, NO_PHOTOS_PLACEHOLDER, PDF_ALERT, TRUNCATION_WARNING,
};
use crate::config::{BookConfig, MarkupPolicy};
use crate::error::BookError;
use crate::model::{ExportPayload, Questionnaire};
use crate::pipeline::encode::{self, ImageSource};
use crate::pipeline::skeleton;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// The two buttons that start a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Generate,
    Export,
}

impl Trigger {
    pub fn idle_label(self) -> &'static str {
        match self {
            Trigger::Generate => "AIにメモリアルブックの作成を依頼する",
            Trigger::Export => "PDFとしてダウンロード",
        }
    }

    pub fn busy_label(self) -> &'static str {
        match self {
            Trigger::Generate => "AIが物語を生成中です...",
            Trigger::Export => "PDFを生成中...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerState {
    pub enabled: bool,
    pub label: &'static str,
}

impl TriggerState {
    pub fn idle(trigger: Trigger) -> Self {
        Self {
            enabled: true,
            label: trigger.idle_label(),
        }
    }

    pub fn busy(trigger: Trigger) -> Self {
        Self {
            enabled: false,
            label: trigger.busy_label(),
        }
    }
}

/// Visibility of the three page sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub input_form: bool,
    pub display: bool,
    pub export_control: bool,
}

impl Sections {
    pub const COLLECTING: Sections = Sections {
        input_form: true,
        display: false,
        export_control: false,
    };

    pub const DISPLAYING: Sections = Sections {
        input_form: false,
        display: true,
        export_control: true,
    };
}

/// What the preview area shows for the current selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Placeholder(&'static str),
    Photos(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    CollectingInput,
    DisplayingResult {
        book: DisplayedBook,
        last: LastGeneration,
    },
}

impl View {
    pub fn sections(&self) -> Sections {
        match self {
            View::CollectingInput => Sections::COLLECTING,
            View::DisplayingResult { .. } => Sections::DISPLAYING,
        }
    }
}

/// Receives everything the user should see.
///
/// All methods default to no-ops so implementations only override what they
/// present.
pub trait Frontend: Send + Sync {
    fn alert(&self, message: &str) {
        let _ = message;
    }

    fn warn(&self, message: &str) {
        let _ = message;
    }

    fn preview_changed(&self, preview: &Preview) {
        let _ = preview;
    }

    fn trigger_changed(&self, trigger: Trigger, state: TriggerState) {
        let _ = (trigger, state);
    }

    fn sections_changed(&self, sections: Sections) {
        let _ = sections;
    }

    fn book_displayed(&self, book: &DisplayedBook) {
        let _ = book;
    }

    fn scroll_into_view(&self, element_id: &str) {
        let _ = element_id;
    }
}

/// A [`Frontend`] that presents nothing.
pub struct NoopFrontend;

impl Frontend for NoopFrontend {}

struct State {
    view: View,
    selection: Vec<ImageSource>,
    generate: TriggerState,
    export: TriggerState,
}

impl State {
    fn trigger_mut(&mut self, trigger: Trigger) -> &mut TriggerState {
        match trigger {
            Trigger::Generate => &mut self.generate,
            Trigger::Export => &mut self.export,
        }
    }
}

pub struct BookSession {
    api: Arc<dyn BookApi>,
    downloads: Arc<dyn DownloadSink>,
    frontend: Arc<dyn Frontend>,
    subtitle: String,
    file_name: String,
    policy: MarkupPolicy,
    state: Mutex<State>,
}

/// Holds a trigger disabled; restores it when dropped.
pub struct TriggerLock<'a> {
    session: &'a BookSession,
    trigger: Trigger,
}

impl Drop for TriggerLock<'_> {
    fn drop(&mut self) {
        self.session.set_trigger(self.trigger, TriggerState::idle(self.trigger));
    }
}

impl BookSession {
    pub fn new(
        api: Arc<dyn BookApi>,
        downloads: Arc<dyn DownloadSink>,
        frontend: Arc<dyn Frontend>,
        config: &BookConfig,
    ) -> Self {
        Self {
            api,
            downloads,
            frontend,
            subtitle: config.subtitle.clone(),
            file_name: config.download_file_name.clone(),
            policy: config.markup_policy,
            state: Mutex::new(State {
                view: View::CollectingInput,
                selection: Vec::new(),
                generate: TriggerState::idle(Trigger::Generate),
                export: TriggerState::idle(Trigger::Export),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> View {
        self.state().view.clone()
    }

    pub fn sections(&self) -> Sections {
        self.state().view.sections()
    }

    pub fn trigger(&self, trigger: Trigger) -> TriggerState {
        *self.state().trigger_mut(trigger)
    }

    pub fn selection(&self) -> Vec<ImageSource> {
        self.state().selection.clone()
    }

    fn set_trigger(&self, trigger: Trigger, value: TriggerState) {
        *self.state().trigger_mut(trigger) = value;
        self.frontend.trigger_changed(trigger, value);
    }

    /// Disable `trigger` for the lifetime of the returned lock.
    pub fn lock_trigger(&self, trigger: Trigger) -> Result<TriggerLock<'_>, BookError> {
        {
            let mut state = self.state();
            let slot = state.trigger_mut(trigger);
            if !slot.enabled {
                return Err(BookError::InvalidState(format!(
                    "{trigger:?} request already in progress"
                )));
            }
            *slot = TriggerState::busy(trigger);
        }
        self.frontend.trigger_changed(trigger, TriggerState::busy(trigger));
        Ok(TriggerLock {
            session: self,
            trigger,
        })
    }

    /// Replace the photo selection. Only the first three are kept.
    pub fn choose_photos(&self, files: Vec<ImageSource>) -> Preview {
        let (files, notice) = encode::cap_selection(files);
        if notice.is_some() {
            self.frontend.warn(TRUNCATION_WARNING);
        }
        let preview = if files.is_empty() {
            Preview::Placeholder(NO_PHOTOS_PLACEHOLDER)
        } else {
            Preview::Photos(files.iter().map(ImageSource::name).collect())
        };
        self.state().selection = files;
        self.frontend.preview_changed(&preview);
        preview
    }

    /// Replace the selection without going through [`choose_photos`]: no
    /// cap, no preview, no warning. This is how the selection looks after
    /// the page restores or rewrites the file input on its own.
    ///
    /// [`choose_photos`]: BookSession::choose_photos
    pub fn replace_selection(&self, files: Vec<ImageSource>) {
        self.state().selection = files;
    }

    /// Encode the photos, request a story and display the book.
    pub async fn submit(&self, questionnaire: Questionnaire) -> Result<(), BookError> {
        if matches!(self.state().view, View::DisplayingResult { .. }) {
            return Err(BookError::InvalidState("the book is already displayed".into()));
        }
        let _lock = self.lock_trigger(Trigger::Generate)?;

        // The selection may have changed since it was made.
        let (selection, _) = encode::cap_selection(self.selection());
        let images = match encode::encode_all(&selection).await {
            Ok(images) => images,
            Err(e) => {
                warn!("Photos could not be read: {}", e);
                self.frontend.alert(ATTACHMENT_ALERT);
                return Err(e);
            }
        };

        let story = match self.api.generate_story(&questionnaire).await {
            Ok(story) => story,
            Err(e) => {
                warn!("Story request failed: {}", e);
                self.frontend.alert(GENERATION_ALERT);
                return Err(e);
            }
        };

        let (book, last) =
            assemble::assemble(&questionnaire, &self.subtitle, story, images, self.policy);
        info!(
            "Displaying book: {} photos, {} paragraphs",
            last.images().len(),
            last.story().paragraph_count()
        );
        self.frontend.book_displayed(&book);
        self.state().view = View::DisplayingResult { book, last };
        self.frontend.sections_changed(Sections::DISPLAYING);
        self.frontend.scroll_into_view(skeleton::BOOK_CONTAINER_ID);
        Ok(())
    }

    /// Let page scripts modify the displayed book.
    pub fn edit_display(&self, edit: impl FnOnce(&mut DisplayedBook)) -> Result<(), BookError> {
        match &mut self.state().view {
            View::DisplayingResult { book, .. } => {
                edit(book);
                Ok(())
            }
            View::CollectingInput => Err(BookError::InvalidState("no book is displayed".into())),
        }
    }

    /// The export request for the displayed book.
    ///
    /// Title and subtitle are read from the display; story and photos come
    /// from the retained [`LastGeneration`].
    pub fn export_payload(&self) -> Result<ExportPayload, BookError> {
        match &self.state().view {
            View::DisplayingResult { book, last } => Ok(ExportPayload {
                title: book.title()?,
                subtitle: book.subtitle()?,
                story_html: last.story().clone(),
                image_data_urls: last.images().to_vec(),
            }),
            View::CollectingInput => Err(BookError::InvalidState("no book is displayed".into())),
        }
    }

    /// Request the PDF and save it under the fixed download name.
    pub async fn export(&self) -> Result<PathBuf, BookError> {
        let _lock = self.lock_trigger(Trigger::Export)?;

        let result = async {
            let payload = self.export_payload()?;
            let bytes = self.api.download_pdf(&payload).await?;
            self.downloads.deliver(&self.file_name, &bytes)
        }
        .await;

        if let Err(ref e) = result {
            warn!("Export failed: {}", e);
            self.frontend.alert(PDF_ALERT);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EncodedImage, NarrativeMarkup, MAX_IMAGES};
    use async_trait::async_trait;
    use std::path::Path;

    const STORY: &str = r#"<p>一</p><p><span class="highlight">ハコスカ</span></p><p>三</p>"#;

    #[derive(Default)]
    struct FakeApi {
        fail_generate: bool,
        fail_download: bool,
        payloads: Mutex<Vec<ExportPayload>>,
        generate_calls: Mutex<usize>,
    }

    #[async_trait]
    impl BookApi for FakeApi {
        async fn generate_story(&self, _q: &Questionnaire) -> Result<NarrativeMarkup, BookError> {
            *self.generate_calls.lock().unwrap() += 1;
            if self.fail_generate {
                return Err(BookError::generation("HTTP 500"));
            }
            Ok(NarrativeMarkup::new(STORY))
        }

        async fn download_pdf(&self, payload: &ExportPayload) -> Result<Vec<u8>, BookError> {
            self.payloads.lock().unwrap().push(payload.clone());
            if self.fail_download {
                return Err(BookError::render("HTTP 500"));
            }
            Ok(b"%PDF-1.7".to_vec())
        }
    }

    #[derive(Default)]
    struct FakeSink(Mutex<Vec<String>>);

    impl DownloadSink for FakeSink {
        fn deliver(&self, file_name: &str, _bytes: &[u8]) -> Result<PathBuf, BookError> {
            self.0.lock().unwrap().push(file_name.to_string());
            Ok(Path::new("/downloads").join(file_name))
        }
    }

    #[derive(Default)]
    struct Screen {
        alerts: Mutex<Vec<String>>,
        warnings: Mutex<Vec<String>>,
        triggers: Mutex<Vec<(Trigger, TriggerState)>>,
        sections: Mutex<Vec<Sections>>,
        scrolled: Mutex<Vec<String>>,
    }

    impl Frontend for Screen {
        fn alert(&self, message: &str) {
            self.alerts.lock().unwrap().push(message.into());
        }
        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.into());
        }
        fn trigger_changed(&self, trigger: Trigger, state: TriggerState) {
            self.triggers.lock().unwrap().push((trigger, state));
        }
        fn sections_changed(&self, sections: Sections) {
            self.sections.lock().unwrap().push(sections);
        }
        fn scroll_into_view(&self, element_id: &str) {
            self.scrolled.lock().unwrap().push(element_id.into());
        }
    }

    struct Rig {
        api: Arc<FakeApi>,
        sink: Arc<FakeSink>,
        screen: Arc<Screen>,
        session: BookSession,
    }

    fn rig(api: FakeApi) -> Rig {
        let api = Arc::new(api);
        let sink = Arc::new(FakeSink::default());
        let screen = Arc::new(Screen::default());
        let session = BookSession::new(
            api.clone(),
            sink.clone(),
            screen.clone(),
            &BookConfig::default(),
        );
        Rig {
            api,
            sink,
            screen,
            session,
        }
    }

    fn gif(name: &str) -> ImageSource {
        ImageSource::Bytes {
            name: name.into(),
            bytes: b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec(),
        }
    }

    fn questionnaire() -> Questionnaire {
        Questionnaire {
            vehicle_name: "スカイライン・ハコスカ".into(),
            nickname: String::new(),
            first_memory: "納車の日".into(),
            memorable_drive: "海沿いの道".into(),
            favorite_song: "夏の歌".into(),
            final_words: "ありがとう".into(),
        }
    }

    #[test]
    fn selection_is_capped_with_warning() {
        let r = rig(FakeApi::default());
        let preview = r
            .session
            .choose_photos((1..=5).map(|i| gif(&format!("{i}.gif"))).collect());
        assert_eq!(
            preview,
            Preview::Photos(vec!["1.gif".into(), "2.gif".into(), "3.gif".into()])
        );
        assert_eq!(r.screen.warnings.lock().unwrap().as_slice(), [TRUNCATION_WARNING]);
    }

    #[test]
    fn empty_selection_shows_placeholder() {
        let r = rig(FakeApi::default());
        assert_eq!(
            r.session.choose_photos(vec![]),
            Preview::Placeholder(NO_PHOTOS_PLACEHOLDER)
        );
        assert!(r.screen.warnings.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_transitions_to_display() {
        let r = rig(FakeApi::default());
        r.session.choose_photos(vec![gif("a.gif"), gif("b.gif")]);
        r.session.submit(questionnaire()).await.unwrap();

        assert_eq!(r.session.sections(), Sections::DISPLAYING);
        assert_eq!(
            r.screen.scrolled.lock().unwrap().as_slice(),
            [skeleton::BOOK_CONTAINER_ID]
        );
        match r.session.view() {
            View::DisplayingResult { book, last } => {
                assert_eq!(book.title().unwrap(), "ハコスカとの物語");
                assert_eq!(book.photo_count(), 2);
                assert_eq!(last.story().as_str(), STORY);
            }
            View::CollectingInput => panic!("still collecting"),
        }
        assert_eq!(
            r.screen.triggers.lock().unwrap().as_slice(),
            [
                (Trigger::Generate, TriggerState::busy(Trigger::Generate)),
                (Trigger::Generate, TriggerState::idle(Trigger::Generate)),
            ]
        );
    }

    #[tokio::test]
    async fn generate_failure_keeps_input_view() {
        let r = rig(FakeApi {
            fail_generate: true,
            ..Default::default()
        });
        let err = r.session.submit(questionnaire()).await.unwrap_err();
        assert!(matches!(err, BookError::GenerationFailure { .. }));
        assert_eq!(r.session.view(), View::CollectingInput);
        assert!(r.screen.sections.lock().unwrap().is_empty());
        assert_eq!(r.screen.alerts.lock().unwrap().as_slice(), [GENERATION_ALERT]);
        assert_eq!(
            r.session.trigger(Trigger::Generate),
            TriggerState::idle(Trigger::Generate)
        );
        assert!(r.session.export_payload().is_err());
    }

    #[tokio::test]
    async fn unreadable_photo_stops_before_request() {
        let r = rig(FakeApi::default());
        r.session.choose_photos(vec![
            gif("a.gif"),
            ImageSource::Path(PathBuf::from("/no/such/photo.jpg")),
        ]);
        let err = r.session.submit(questionnaire()).await.unwrap_err();
        assert!(matches!(err, BookError::AttachmentFailure { .. }));
        assert_eq!(*r.api.generate_calls.lock().unwrap(), 0);
        assert_eq!(r.session.view(), View::CollectingInput);
        assert_eq!(r.screen.alerts.lock().unwrap().as_slice(), [ATTACHMENT_ALERT]);
    }

    #[tokio::test]
    async fn second_submit_is_refused() {
        let r = rig(FakeApi::default());
        r.session.submit(questionnaire()).await.unwrap();
        let err = r.session.submit(questionnaire()).await.unwrap_err();
        assert!(matches!(err, BookError::InvalidState(_)));
    }

    #[tokio::test]
    async fn busy_trigger_refuses_reentry() {
        let r = rig(FakeApi::default());
        let _held = r.session.lock_trigger(Trigger::Generate).unwrap();
        let err = r.session.submit(questionnaire()).await.unwrap_err();
        assert!(matches!(err, BookError::InvalidState(_)));
        assert_eq!(*r.api.generate_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn export_uses_retained_state_after_dom_edits() {
        let r = rig(FakeApi::default());
        r.session.choose_photos(vec![gif("a.gif"), gif("b.gif")]);
        r.session.submit(questionnaire()).await.unwrap();

        let before = match r.session.view() {
            View::DisplayingResult { last, .. } => last,
            View::CollectingInput => panic!("not displayed"),
        };
        r.session
            .edit_display(|book| {
                let html = book.html_mut();
                *html = html.replace("ハコスカ</span>", "改変</span>");
                *html = html.replace(r#"<img class="memorial-photo""#, "<img");
            })
            .unwrap();

        let path = r.session.export().await.unwrap();
        assert_eq!(path, Path::new("/downloads/愛車メモリアルブック.pdf"));

        let payloads = r.api.payloads.lock().unwrap();
        assert_eq!(payloads[0].story_html, *before.story());
        assert_eq!(payloads[0].image_data_urls, before.images());
        assert_eq!(payloads[0].title, "ハコスカとの物語");
        assert_eq!(payloads[0].subtitle, crate::model::SUBTITLE);
    }

    #[tokio::test]
    async fn export_failure_restores_trigger_and_skips_download() {
        let r = rig(FakeApi {
            fail_download: true,
            ..Default::default()
        });
        r.session.submit(questionnaire()).await.unwrap();
        let err = r.session.export().await.unwrap_err();
        assert!(matches!(err, BookError::RenderFailure { .. }));
        assert!(r.sink.0.lock().unwrap().is_empty());
        assert_eq!(r.session.trigger(Trigger::Export), TriggerState::idle(Trigger::Export));
        assert_eq!(r.session.trigger(Trigger::Export).label, "PDFとしてダウンロード");
        assert_eq!(r.screen.alerts.lock().unwrap().as_slice(), [PDF_ALERT]);
    }

    #[tokio::test]
    async fn export_before_display_is_invalid() {
        let r = rig(FakeApi::default());
        let err = r.session.export().await.unwrap_err();
        assert!(matches!(err, BookError::InvalidState(_)));
        assert_eq!(r.session.trigger(Trigger::Export), TriggerState::idle(Trigger::Export));
    }

    #[tokio::test]
    async fn unreadable_title_alerts_on_export() {
        let r = rig(FakeApi::default());
        r.session.submit(questionnaire()).await.unwrap();
        r.session.edit_display(|book| book.html_mut().clear()).unwrap();

        let err = r.session.export().await.unwrap_err();
        assert!(matches!(err, BookError::InvalidState(_)));
        assert_eq!(r.screen.alerts.lock().unwrap().as_slice(), [PDF_ALERT]);
        assert!(r.api.payloads.lock().unwrap().is_empty());
        assert_eq!(r.session.trigger(Trigger::Export), TriggerState::idle(Trigger::Export));
    }

    #[tokio::test]
    async fn submit_caps_a_selection_that_bypassed_the_picker() {
        let r = rig(FakeApi::default());
        r.session
            .replace_selection((1..=5).map(|i| gif(&format!("{i}.gif"))).collect());
        assert_eq!(r.session.selection().len(), 5);

        r.session.submit(questionnaire()).await.unwrap();
        let payload = r.session.export_payload().unwrap();
        assert_eq!(payload.image_data_urls.len(), MAX_IMAGES);
        match r.session.view() {
            View::DisplayingResult { book, .. } => assert_eq!(book.photo_count(), MAX_IMAGES),
            View::CollectingInput => panic!("not displayed"),
        }
    }

    #[test]
    fn retained_images_match_selection_order() {
        let images = vec![
            EncodedImage::from_data_url("data:image/png;base64,AAAA"),
            EncodedImage::from_data_url("data:image/gif;base64,BBBB"),
        ];
        let last = LastGeneration::new(NarrativeMarkup::new(STORY), images.clone());
        assert_eq!(last.images(), images.as_slice());
    }
}
