// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::path::Path;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Derives a clip's display name from its uploaded file name by dropping a trailing `.mp3`.
pub fn clip_display_name(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    match lower.strip_suffix(".mp3") {
        Some(stem) if !stem.is_empty() => file_name[..stem.len()].to_string(),
        _ => file_name.to_string(),
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use crate::util::{clip_display_name, filename_display};

    #[test]
    fn test_clip_display_name() {
        assert_eq!("torjubel", clip_display_name("torjubel.mp3"));
        assert_eq!("Torjubel", clip_display_name("Torjubel.MP3"));
        assert_eq!("crowd.mp3.bak", clip_display_name("crowd.mp3.bak"));
        assert_eq!("horn", clip_display_name("horn"));
        assert_eq!(".mp3", clip_display_name(".mp3"));
    }

    #[test]
    fn test_filename_display() {
        assert_eq!("horn.mp3", filename_display(Path::new("/tmp/sounds/horn.mp3")));
        assert_eq!("unreadable file name", filename_display(Path::new("/")));
    }
}
