//! Exam to PDF export.
//!
//! Layout and rendering are separate steps: [`layout_exam`] places every
//! line on a page with a top-down cursor in millimetres, and [`render_pdf`]
//! draws the finished layout with `printpdf`.

use std::io::BufWriter;

use printpdf::{BuiltinFont, Mm, PdfDocument};
use thiserror::Error;

use crate::schemas::exam::{option_label, ExamPayload};

pub(crate) const PAGE_WIDTH_MM: f32 = 210.0;
pub(crate) const PAGE_HEIGHT_MM: f32 = 297.0;
pub(crate) const TOP_MARGIN_MM: f32 = 20.0;
const LEFT_MARGIN_MM: f32 = 20.0;
const INDENT_MM: f32 = 6.0;
const WRAP_CHARS: usize = 90;

#[derive(Debug, Error)]
pub(crate) enum ExportError {
    #[error("Exam has no questions to export")]
    EmptyExam,
    #[error("Page break threshold {0}mm must be between the top margin and the page height")]
    InvalidPageBreak(f32),
    #[error("PDF rendering failed: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineStyle {
    Title,
    Heading,
    Body,
    Answer,
}

impl LineStyle {
    fn font_size(self) -> f32 {
        match self {
            Self::Title => 16.0,
            Self::Heading => 11.0,
            Self::Body | Self::Answer => 10.0,
        }
    }

    /// Vertical space the line takes, in millimetres.
    fn height(self) -> f32 {
        match self {
            Self::Title => 10.0,
            Self::Heading => 6.5,
            Self::Body | Self::Answer => 5.5,
        }
    }

    fn bold(self) -> bool {
        matches!(self, Self::Title | Self::Heading | Self::Answer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlacedLine {
    pub(crate) text: String,
    pub(crate) style: LineStyle,
    pub(crate) x_mm: f32,
    /// Baseline distance from the top edge of the page.
    pub(crate) y_mm: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PageLayout {
    pub(crate) lines: Vec<PlacedLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExamLayout {
    pub(crate) title: String,
    pub(crate) pages: Vec<PageLayout>,
}

struct Cursor {
    page_break_mm: f32,
    y_mm: f32,
    pages: Vec<PageLayout>,
}

impl Cursor {
    fn new(page_break_mm: f32) -> Self {
        Self { page_break_mm, y_mm: TOP_MARGIN_MM, pages: vec![PageLayout::default()] }
    }

    fn place(&mut self, text: impl Into<String>, style: LineStyle, x_mm: f32) {
        let height = style.height();
        if self.y_mm + height > self.page_break_mm {
            self.pages.push(PageLayout::default());
            self.y_mm = TOP_MARGIN_MM;
        }
        self.y_mm += height;
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(PlacedLine { text: text.into(), style, x_mm, y_mm: self.y_mm });
        }
    }

    fn place_wrapped(&mut self, text: &str, style: LineStyle, x_mm: f32) {
        for line in wrap_text(text, WRAP_CHARS) {
            self.place(line, style, x_mm);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y_mm = (self.y_mm + mm).min(self.page_break_mm);
    }
}

pub(crate) fn layout_exam(exam: &ExamPayload, page_break_mm: f32) -> Result<ExamLayout, ExportError> {
    if exam.questions.is_empty() {
        return Err(ExportError::EmptyExam);
    }
    if !(page_break_mm > TOP_MARGIN_MM + LineStyle::Title.height()
        && page_break_mm <= PAGE_HEIGHT_MM)
    {
        return Err(ExportError::InvalidPageBreak(page_break_mm));
    }

    let mut cursor = Cursor::new(page_break_mm);

    cursor.place_wrapped(&exam.exam_name, LineStyle::Title, LEFT_MARGIN_MM);
    for header in [
        format!("Book: {}", exam.book_name),
        format!("Date: {}", exam.date),
        format!("Duration: {} minutes", exam.duration),
        format!("Total questions: {}", exam.questions.len()),
        format!("Marks per question: {}", format_marks(exam.marks_per_question)),
        format!("Total marks: {}", format_marks(exam.total_marks)),
    ] {
        cursor.place(header, LineStyle::Body, LEFT_MARGIN_MM);
    }
    cursor.gap(4.0);

    for (index, question) in exam.questions.iter().enumerate() {
        cursor.place_wrapped(
            &format!("{}. {}", index + 1, question.question_text),
            LineStyle::Heading,
            LEFT_MARGIN_MM,
        );

        for (option_index, option) in question.options.iter().enumerate() {
            let label = if option.option.is_empty() {
                option_label(option_index)
            } else {
                option.option.clone()
            };
            cursor.place_wrapped(
                &format!("{label}. {}", option.text),
                LineStyle::Body,
                LEFT_MARGIN_MM + INDENT_MM,
            );
        }

        let correct = question
            .correct_option_index()
            .map(|option_index| {
                let option = &question.options[option_index];
                if option.option.is_empty() {
                    option_label(option_index)
                } else {
                    option.option.clone()
                }
            })
            .unwrap_or_else(|| "not set".to_string());
        cursor.place(format!("Correct answer: {correct}"), LineStyle::Answer, LEFT_MARGIN_MM);

        if let Some(explanation) = question.explanation.as_deref().filter(|e| !e.trim().is_empty()) {
            cursor.place_wrapped(
                &format!("Explanation: {explanation}"),
                LineStyle::Body,
                LEFT_MARGIN_MM,
            );
        }
        cursor.gap(3.0);
    }

    Ok(ExamLayout { title: exam.exam_name.clone(), pages: cursor.pages })
}

pub(crate) fn render_pdf(layout: &ExamLayout) -> Result<Vec<u8>, ExportError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(&layout.title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ExportError::Render(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ExportError::Render(format!("font error: {e}")))?;

    for (page_number, page) in layout.pages.iter().enumerate() {
        let (page_index, layer_index) = if page_number == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1")
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);

        for line in &page.lines {
            let face = if line.style.bold() { &bold } else { &font };
            // printpdf measures y from the bottom edge.
            layer.use_text(
                line.text.as_str(),
                line.style.font_size(),
                Mm(line.x_mm),
                Mm(PAGE_HEIGHT_MM - line.y_mm),
                face,
            );
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| ExportError::Render(format!("save error: {e}")))?;
    buf.into_inner().map_err(|e| ExportError::Render(format!("buffer error: {e}")))
}

pub(crate) fn export_exam(exam: &ExamPayload, page_break_mm: f32) -> Result<Vec<u8>, ExportError> {
    let layout = layout_exam(exam, page_break_mm)?;
    tracing::debug!(
        exam_name = %exam.exam_name,
        pages = layout.pages.len(),
        "Exam laid out for export"
    );
    render_pdf(&layout)
}

/// File name for `Content-Disposition`: ASCII alphanumerics, `-` and `_` only.
pub(crate) fn export_filename(exam_name: &str) -> String {
    let mut stem = String::with_capacity(exam_name.len());
    let mut last_was_sep = false;
    for ch in exam_name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            stem.push(ch);
            last_was_sep = false;
        } else if !last_was_sep && !stem.is_empty() {
            stem.push('_');
            last_was_sep = true;
        }
    }
    let stem = stem.trim_end_matches('_');
    if stem.is_empty() {
        "exam.pdf".to_string()
    } else {
        format!("{stem}.pdf")
    }
}

fn format_marks(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
