use std::path::Path;

use learning_loop_protocol::NodeId;

const IDENTITY_FILE: &str = "uuid.txt";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("could not read or create {0}: {1}")]
    Io(std::path::PathBuf, #[source] std::io::Error),
}

/// On first start, generates a fresh uuid and writes it to `<data>/uuid.txt`; on subsequent
/// starts, reads it back. A node's identity survives restarts this way.
pub fn load_or_create(data_folder: &Path) -> Result<NodeId, IdentityError> {
    let path = data_folder.join(IDENTITY_FILE);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(NodeId::new(contents.trim().to_string())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let id = NodeId::generate();
            std::fs::create_dir_all(data_folder).map_err(|e| IdentityError::Io(path.clone(), e))?;
            std::fs::write(&path, id.as_str()).map_err(|e| IdentityError::Io(path.clone(), e))?;
            Ok(id)
        }
        Err(err) => Err(IdentityError::Io(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create(dir.path()).unwrap();
        let second = load_or_create(dir.path()).unwrap();
        assert_eq!(first, second);
    }
}
