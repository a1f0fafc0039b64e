//! CGI command vocabulary
//!
//! Every request is `root + command + path`, where the path loses its
//! leading slash because each command already ends in one (or is empty).

/// Operations the card understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardCommand {
    /// Plain file download
    Download,
    ListFiles,
    CountFiles,
    GetThumbnail,
    GetFirmwareVersion,
    GetCid,
    GetSsid,
    GetUpdateStatus,
    GetWriteTimestamp,
    GetUploadParams,
    DeleteFile,
}

impl CardCommand {
    /// CGI fragment inserted between the root and the path
    pub fn cgi(&self) -> &'static str {
        match self {
            CardCommand::Download => "",
            CardCommand::ListFiles => "command.cgi?op=100&DIR=/",
            CardCommand::CountFiles => "command.cgi?op=101&DIR=/",
            CardCommand::GetThumbnail => "thumbnail.cgi?/",
            CardCommand::GetFirmwareVersion => "command.cgi?op=108",
            CardCommand::GetCid => "command.cgi?op=120",
            CardCommand::GetSsid => "command.cgi?op=104",
            CardCommand::GetUpdateStatus => "command.cgi?op=102",
            CardCommand::GetWriteTimestamp => "command.cgi?op=121",
            CardCommand::GetUploadParams => "command.cgi?op=118",
            CardCommand::DeleteFile => "upload.cgi?DEL=/",
        }
    }

    /// Builds the request URL for `path` under `root`
    pub fn url(&self, root: &str, path: &str) -> String {
        format!("{}{}{}", root, self.cgi(), path.trim_start_matches('/'))
    }
}
