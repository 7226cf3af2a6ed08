// SPDX-License-Identifier: GPL-3.0-only

//! Decoding pipelines that run off the calling thread
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ ImageSource  │ ──▶ │  Async Dispatcher │ ──▶ │  on_complete()   │
//! │              │     │  - one worker     │     │  (worker thread) │
//! └──────────────┘     └───────────────────┘     └──────────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ Raw frames   │ ──▶ │  Frame Decoding   │ ──▶ │  FrameListener   │
//! │ (producers)  │     │  - bounded queue  │     │  (decode thread) │
//! │              │     │  - decode thread  │     │                  │
//! └──────────────┘     └───────────────────┘     └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`async_decode`]: one-shot decode on a worker thread
//! - [`frame_decoding`]: bounded frame queue drained by a decoding thread
//! - [`decode_loop`]: named loop thread with bounded-time shutdown

pub mod async_decode;
pub mod decode_loop;
pub mod frame_decoding;
