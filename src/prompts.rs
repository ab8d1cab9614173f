//! Prompts for memorial-story generation.
//!
//! Every prompt lives here so the wording can change without touching the
//! exchange or error handling in [`crate::pipeline::llm`], and so tests can
//! inspect the exact text sent to the model.

use crate::model::Questionnaire;

/// Shown to the model in place of an empty optional field.
pub const NOT_SET: &str = "(設定なし)";

/// System prompt: role, tone and the permitted markup vocabulary.
///
/// The vocabulary named here (`<p>` and `<span class="highlight">`) is the
/// same one [`crate::pipeline::markup::sanitize`] lets through.
pub const STORY_SYSTEM_PROMPT: &str = r#"あなたは、長年連れ添った愛車との別れを惜しむ人のための、感動的な物語を生成する作家です。
ユーザー入力を元に、温かく、少しノスタルジックで、心に響く物語を作成してください。
ですます調の、自然で美しい日本語で記述してください。
HTMLの<p>タグで段落を分けて、全体で3つの段落にまとめてください。
キーワードは<span class="highlight"></span>で囲んでください。
それ以外のHTMLタグ、Markdown、コードブロック、前置きや説明は出力しないでください。"#;

/// Render the questionnaire as the user turn of the generation request.
pub fn story_request(q: &Questionnaire) -> String {
    format!(
        "# ユーザー入力:\n\
         - 車種: {}\n\
         - ニックネーム: {}\n\
         - 出会い、第一印象: {}\n\
         - 一番の思い出のドライブ: {}\n\
         - よく聴いた曲: {}\n\
         - 最後の言葉: {}",
        q.vehicle_name,
        or_not_set(&q.nickname),
        q.first_memory,
        q.memorable_drive,
        or_not_set(&q.favorite_song),
        q.final_words,
    )
}

fn or_not_set(value: &str) -> &str {
    if value.trim().is_empty() {
        NOT_SET
    } else {
        value
    }
}
