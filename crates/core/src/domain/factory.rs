use super::change::ChangeType;
use super::events::{MovedFrom, ObjectEvent, SyncEvent};
use super::remote::RemoteObject;
use crate::error::Result;
use std::path::PathBuf;

/// Build a file or folder event for the given change axes.
///
/// When either axis is [`ChangeType::Moved`] the moved variant is built and
/// carries the old identities. The returned event echoes `local_change` and
/// `remote_change` exactly. Fails when neither `remote` nor `local` is given.
pub fn create_event(
    is_file: bool,
    remote: Option<RemoteObject>,
    local: Option<PathBuf>,
    remote_change: ChangeType,
    local_change: ChangeType,
    old_remote_path: Option<String>,
    old_local_path: Option<PathBuf>,
) -> Result<SyncEvent> {
    let event = if is_file {
        ObjectEvent::file(local, remote, local_change, remote_change)?
    } else {
        ObjectEvent::folder(local, remote, local_change, remote_change)?
    };

    let moved = local_change == ChangeType::Moved || remote_change == ChangeType::Moved;
    let event = if moved {
        event.with_moved_from(MovedFrom {
            old_local_path,
            old_remote_path,
        })
    } else {
        event
    };

    Ok(SyncEvent::Object(event))
}
