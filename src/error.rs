use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

pub type StoryResult<T> = Result<T, StoryError>;

#[derive(Debug, Error, Diagnostic)]
pub enum StoryError {
    #[error("chapter '{chapter_id}' not found")]
    #[diagnostic(
        code("story.chapter_not_found"),
        help("open a chapter listed by the content repository")
    )]
    ChapterNotFound { chapter_id: String },
    #[error("content validation failed: {0}")]
    #[diagnostic(code("story.invalid_content"))]
    InvalidContent(String),
    #[error("resource limit exceeded: {0}")]
    #[diagnostic(code("story.resource_limit"))]
    ResourceLimit(String),
    #[error("serialization error: {message}")]
    #[diagnostic(code("story.serialization"))]
    Serialization {
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },
    #[error("configuration error: {0}")]
    #[diagnostic(code("story.config"))]
    Config(String),
}

impl StoryError {
    pub(crate) fn chapter_not_found(chapter_id: &str) -> Self {
        StoryError::ChapterNotFound {
            chapter_id: chapter_id.to_string(),
        }
    }
}

/// Maps a serde_json error onto a labelled span of the offending input.
pub(crate) fn json_deserialize_error(input: &str, err: &serde_json::Error) -> StoryError {
    let offset = line_col_to_offset(input, err.line(), err.column());
    let len = input[offset..].chars().next().map_or(0, char::len_utf8);
    StoryError::Serialization {
        message: err.to_string(),
        src: input.to_string(),
        span: (offset, len).into(),
    }
}

#[cold]
fn line_col_to_offset(input: &str, line: usize, column: usize) -> usize {
    if line == 0 || column == 0 {
        return 0;
    }
    let mut offset = 0usize;
    for (idx, chunk) in input.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let byte_index = chunk
                .char_indices()
                .nth(column - 1)
                .map(|(byte, _)| byte)
                .or_else(|| chunk.char_indices().last().map(|(byte, _)| byte))
                .unwrap_or(0);
            return offset + byte_index;
        }
        offset += chunk.len();
    }
    input.len()
}
