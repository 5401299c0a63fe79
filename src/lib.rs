pub mod attachment;
pub mod config;
pub mod dataset;
pub mod db;
pub mod importer;
pub mod labels;
pub mod mailbox;
pub mod output;
pub mod staging;
pub mod validator;
pub mod workflow;
