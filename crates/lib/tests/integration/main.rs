mod build_tests;
mod common;
mod watch_tests;
