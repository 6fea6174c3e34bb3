//! # mindcare
//!
//! Backend for a mental-health support chat. A tool-using agent talks with
//! the user, consults a DSM-5 reference corpus through a vector index, and
//! records a qualitative wellness score when an assessment is complete.
//!
//! ## Architecture
//!
//! ```text
//!  offline (mindcare build)                 online (per chat turn)
//! ┌────────┐  ┌───────┐  ┌───────────┐     ┌──────────┐  ┌────────────┐
//! │ loader │─▶│ chunk │─▶│  ingest   │     │ service  │─▶│   agent    │
//! │ docx/  │  │ token │  │ summarize │     │ session  │  │ memory +   │
//! │ pdf/md │  │windows│  │ + embed   │     └──────────┘  │ tools      │
//! └────────┘  └───────┘  └─────┬─────┘                   └─────┬──────┘
//!                              ▼                               │
//!                        ┌───────────┐    dsm5 tool      ┌─────▼──────┐
//!                        │  index    │◀──────────────────│ chat model │
//!                        │ (SQLite)  │                   └─────┬──────┘
//!                        └───────────┘              save_score │
//!                                        ┌─────────────────────▼─┐
//!                                        │ chat / score / user   │
//!                                        │ stores (JSON, YAML)   │
//!                                        └───────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`models`] | Shared data types |
//! | [`auth`] | Credential store |
//! | [`chat_store`] | Per-user chat history |
//! | [`scores`] | Score store and statistics |
//! | [`export`] | Score export (JSON, CSV) |
//! | [`extract`], [`loader`] | Source document loading |
//! | [`chunk`] | Token-window chunking |
//! | [`ingest`] | Split, summarize, embed with a persisted cache |
//! | [`index`], [`db`], [`migrate`] | Vector index snapshot |
//! | [`query`] | Retrieval-augmented answers over the index |
//! | [`llm`], [`embedding`] | Model clients |
//! | [`tools`] | Agent tools and validated dispatch |
//! | [`memory`] | Token-bounded conversation window |
//! | [`agent`] | Conversational agent |
//! | [`service`] | Library boundary for UIs |
//! | [`server`] | JSON HTTP adapter |
//! | [`build`], [`setup`], [`progress`] | CLI operations |

pub mod agent;
pub mod auth;
pub mod build;
pub mod chat_store;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod prompts;
pub mod query;
pub mod scores;
pub mod server;
pub mod service;
pub mod setup;
pub mod tools;
