use std::path::PathBuf;

use crate::evaluation::Evaluator;
use crate::imaging::NormalizeOptions;
use crate::state::Controller;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub controller: Controller,
    pub evaluator: Option<Box<dyn Evaluator>>,
    pub normalize: NormalizeOptions,
}
