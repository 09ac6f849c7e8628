//! Workflow state storage and the cancel marker.

use std::{fs, io, path::PathBuf};

use crate::model::WorkflowState;

use super::{
    CANCEL_FILE, Result, Storage, StorageError, WORKFLOW_FILE, read_json, write_atomic,
    write_json,
};

impl Storage {
    pub fn save_workflow(&self, id: &str, workflow: &WorkflowState) -> Result<()> {
        let dir = self.existing_project_dir(id)?;
        write_json(&dir.join(WORKFLOW_FILE), workflow)
    }

    pub fn load_workflow(&self, id: &str) -> Result<WorkflowState> {
        let dir = self.existing_project_dir(id)?;
        read_json(&dir.join(WORKFLOW_FILE))?
            .ok_or_else(|| StorageError::Corrupt(format!("{id}: missing workflow")))
    }

    /// Asks the stage running on a project to stop.
    pub fn request_cancel(&self, id: &str) -> Result<()> {
        let dir = self.existing_project_dir(id)?;
        write_atomic(&dir.join(CANCEL_FILE), b"")
    }

    /// The marker file whose presence means a cancel is pending.
    pub fn cancel_marker(&self, id: &str) -> Result<PathBuf> {
        Ok(self.existing_project_dir(id)?.join(CANCEL_FILE))
    }

    pub fn clear_cancel(&self, id: &str) -> Result<()> {
        let dir = self.existing_project_dir(id)?;
        match fs::remove_file(dir.join(CANCEL_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
