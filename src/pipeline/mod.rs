//! Pipeline stages for brain-map protocol resolution.
//!
//! Each submodule implements one step and is testable on its own. The two
//! external dependencies (pdfium and the model) sit behind traits in
//! [`extract`] and [`llm`] so the rest of the pipeline runs without either.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ extract ──▶ llm ──▶ validate ──▶ route
//! (form)     (pdfium)    (JSON)  (vocab/range) (tables)
//! ```
//!
//! 1. [`intake`]   — consent and file checks on the raw form
//! 2. [`extract`]  — page text via pdfium; runs in `spawn_blocking`
//! 3. [`llm`]      — one constrained JSON call; the only network I/O
//! 4. [`validate`] — parse the answer, check condition then index
//! 5. [`route`]    — condition/index → protocol id → phases
//!
//! [`input`] loads a document from a path or URL for the CLI.

pub mod extract;
pub mod input;
pub mod intake;
pub mod llm;
pub mod route;
pub mod validate;
