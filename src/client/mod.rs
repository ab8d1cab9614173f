//! The browser side of the book: photo selection, the generate and export
//! flows, and delivery of the finished PDF.
//!
//! ```text
//! choose_photos ──▶ submit ──────────────▶ export
//!   (cap + warn)    (encode, generate,     (payload from retained state,
//!                    assemble, transition)  render, download)
//! ```
//!
//! The page has two states, collecting input and displaying the result, and
//! moves from the first to the second exactly once. See [`session`].

pub mod api;
pub mod assemble;
pub mod download;
pub mod session;

/// Shown in the preview area when no photo is selected.
pub const NO_PHOTOS_PLACEHOLDER: &str = "選択された画像はありません";

/// Shown when the selection was cut down to the first three photos.
pub const TRUNCATION_WARNING: &str = "添付できる画像は3枚までです。最初の3枚のみが選択されます。";

/// Alert after a failed generation request.
pub const GENERATION_ALERT: &str =
    "物語の生成中にエラーが発生しました。サーバーが起動しているか確認してください。";

/// Alert after a failed export.
pub const PDF_ALERT: &str = "PDFのダウンロードに失敗しました。";

/// Alert when a selected photo could not be read.
pub const ATTACHMENT_ALERT: &str = "画像の読み込みに失敗しました。別の画像を選択してください。";
