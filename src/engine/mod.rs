//! # Engine Module
//!
//! Core engine implementation.
//!
//! This module contains the building blocks of the engine core:
//! - Lock-free task queue, tasks and the worker pool
//! - Daily quests
//! - Component registry, SoA component tables and the component manager
//! - Entity lifecycle requests
//! - Update phases and the engine context
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod queue;
pub mod task;
pub mod task_system;
pub mod quest;
pub mod component;
pub mod table;
pub mod manager;
pub mod phase;
pub mod entity;
pub mod context;
