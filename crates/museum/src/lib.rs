// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod callback;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod location;
pub mod model;
pub mod pages;
pub mod pkce;
pub mod run;
pub mod session;
pub mod storage;
pub mod store;
pub mod test_support;
pub mod token;
