use std::path::PathBuf;

use crate::Context;

/// `<data>/<org>/<project>`
pub fn project_folder(data_folder: &std::path::Path, context: &Context) -> PathBuf {
    data_folder
        .join(&context.organization)
        .join(&context.project)
}

/// `<data>/<org>/<project>/images`
pub fn images_folder(data_folder: &std::path::Path, context: &Context) -> PathBuf {
    project_folder(data_folder, context).join("images")
}

/// `<data>/<org>/<project>/trainings/<training_id>`
pub fn training_folder(data_folder: &std::path::Path, context: &Context, training_id: &str) -> PathBuf {
    project_folder(data_folder, context)
        .join("trainings")
        .join(training_id)
}
