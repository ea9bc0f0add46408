//! # pbm-protocol-resolver
//!
//! Turn a qEEG brain-map PDF into a photobiomodulation (PBM) dosing plan.
//!
//! A clinician uploads the brain map; the service extracts its text, asks a
//! language model to read the "Protocol Selection Table" row out of the
//! recommendations section, and routes the answer through fixed lookup
//! tables. The model only ever reads a value. It never invents a protocol:
//! every answer is checked against a 14-term condition vocabulary and the
//! index range `[1, 24]` before it touches the tables.
//!
//! ## Pipeline Overview
//!
//! ```text
//! multipart form
//!  │
//!  ├─ 1. Intake    consent flag, file present
//!  ├─ 2. Extract   pdfium page text (spawn_blocking), temp file removed after
//!  ├─ 3. Model     one JSON-mode call: {"condition", "index"}
//!  ├─ 4. Validate  parse → condition ∈ vocabulary → index ∈ [1, 24]
//!  ├─ 5. Route     router[condition][index] → protocol id
//!  └─ 6. Define    phases (+ neuroradiant1070 cycles/steps when requested)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pbm_protocol::{server, ProtocolService, ResolverConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ResolverConfig::default();
//!     let service = Arc::new(ProtocolService::from_config(config)?);
//!     server::serve(service, "127.0.0.1:8080".parse()?).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pbm-resolver` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod resolve;
pub mod response;
pub mod server;
pub mod tables;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ResolverConfig, ResolverConfigBuilder, BASELINE_HELMET, NEURORADIANT_HELMET};
pub use error::{ErrorCode, ResolveError};
pub use pipeline::extract::{ExtractedText, PdfiumExtractor, TextExtractor};
pub use pipeline::intake::{RawSubmission, UploadRequest, UploadedFile};
pub use pipeline::llm::{LlmResolver, ModelResolver};
pub use prompts::CONDITIONS;
pub use resolve::ProtocolService;
pub use response::{assemble, Resolution};
pub use tables::ProtocolTables;
