// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local stores, the remote backend and their implementations.

pub mod traits;
pub mod local;
pub mod memory;
pub mod observed;
pub mod rest;
pub mod sqlite;
