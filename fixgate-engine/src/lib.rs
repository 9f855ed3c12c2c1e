/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate Engine
//!
//! Worker wiring for the FixGate gateway core.
//!
//! Three cooperative single-threaded workers make up the engine:
//! - **Framer**: frames inbound bytes, owns and drives every session
//! - **Indexer**: tails the archive, keeps the durable sequence-number
//!   index current
//! - **Replayer**: services resend requests from its command queue
//!
//! Workers exchange nothing but commands over bounded queues and records on
//! the archive stream. This crate also provides the `EngineBuilder` fluent
//! configuration and the `EngineContext` that wires everything together.

pub mod builder;
pub mod command;
pub mod context;
pub mod error;
pub mod framer;
pub mod indexer;
pub mod publication;
pub mod replay_worker;
pub mod worker;

pub use builder::EngineBuilder;
pub use command::{FramerCommand, ReplayCommand};
pub use context::{Engine, EngineContext};
pub use error::LoggingErrorHandler;
pub use framer::Framer;
pub use indexer::Indexer;
pub use publication::StreamPublication;
pub use replay_worker::ReplayWorker;
pub use worker::{IdleStrategy, Worker, WorkerRunner};
