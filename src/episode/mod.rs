mod download;
mod filename;
mod workspace;

pub use download::{DownloadKind, download_to_file};
pub use filename::{
    ARTIFACT_EXTENSION, TITLE_SEPARATOR, artifact_filename, destination_dir, escape_name,
    playlist_filename,
};
pub use workspace::Workspace;
