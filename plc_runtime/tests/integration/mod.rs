mod common;

mod config_files;
mod fault_path;
mod notification;
mod restart;
mod threshold;
