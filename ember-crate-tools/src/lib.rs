//! Ember 工具集
//!
//! 目前只包含日志初始化，各个 crate 以及测试共用同一套日志格式。

pub mod init_log;
