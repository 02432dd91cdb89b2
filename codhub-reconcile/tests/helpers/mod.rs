//! Test Helper Utilities
//!
//! Shared fixtures for codhub-reconcile integration tests

#![allow(dead_code)]

pub mod db_utils;

pub use db_utils::{
    count_orders, create_test_db, has_running_session, insert_account, insert_operation, insert_order, insert_staging, insert_user,
    link_account, order_provider_data, staging_state, test_limits, OrderFixture, StagingFixture,
    StagingState,
};
