/// Upper bounds applied when loading authored chapter content.
#[derive(Clone, Copy, Debug)]
pub struct ResourceLimiter {
    pub max_chapters: usize,
    pub max_lines_per_chapter: usize,
    pub max_text_length: usize,
    pub max_id_length: usize,
    pub max_choices: usize,
    pub max_content_bytes: usize,
}

impl Default for ResourceLimiter {
    fn default() -> Self {
        Self {
            max_chapters: 512,
            max_lines_per_chapter: 10_000,
            max_text_length: 4_096,
            max_id_length: 64,
            max_choices: 8,
            max_content_bytes: 4 * 1024 * 1024,
        }
    }
}
