//! Pipeline stages for DjVu-to-PDF conversion.
//!
//! Each submodule implements one step. External programs are only ever
//! started through [`tools::ToolRunner`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ text ──▶ (overlay) ──▶ encode ──▶ assemble
//! (magic)   (ddjvu)    (djvused /            (JPEG/     (lopdf)
//!                       djvu2hocr /           Flate)
//!                       tesseract)                  └──▶ pdfbeads
//! ```
//!
//! 1. [`input`]    : check the file exists and carries the DjVu magic
//! 2. [`render`]   : page count, native page size, one TIFF per page
//! 3. [`text`]     : word boxes from the configured text source
//! 4. [`encode`]   : compress a rendered page for embedding
//! 5. [`assemble`] : build the PDF in-process, including the outline
//! 6. [`pdfbeads`] : alternative assembly through the `pdfbeads` tool

pub mod assemble;
pub mod encode;
pub mod input;
pub mod pdfbeads;
pub mod render;
pub mod text;
pub mod tools;
