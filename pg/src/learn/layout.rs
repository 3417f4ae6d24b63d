use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::PgError;

pub const FINAL_MODEL_FILE: &str = "ppo_highway_final.json";

/// Files and directories of a training run below its save directory
#[derive(Clone, Debug)]
pub struct SaveDirLayout {
    root: PathBuf,
}

impl SaveDirLayout {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [self.checkpoints_dir(), self.best_model_dir(), self.eval_logs_dir(), self.tb_logs_dir()] {
            fs::create_dir_all(&dir).map_err(PgError::from)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn checkpoints_dir(&self) -> PathBuf { self.root.join("checkpoints") }

    pub fn best_model_dir(&self) -> PathBuf { self.root.join("best_model") }

    pub fn eval_logs_dir(&self) -> PathBuf { self.root.join("eval_logs") }

    pub fn tb_logs_dir(&self) -> PathBuf { self.root.join("tb_logs") }

    pub fn best_model_path(&self) -> PathBuf { self.best_model_dir().join("best_model.json") }

    pub fn evaluation_log_path(&self) -> PathBuf { self.eval_logs_dir().join("evaluations.jsonl") }

    pub fn progress_path(&self) -> PathBuf { self.tb_logs_dir().join("progress.jsonl") }

    pub fn final_model_path(&self) -> PathBuf { self.root.join(FINAL_MODEL_FILE) }
}
