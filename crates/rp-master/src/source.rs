//! Where a session gets its songs from.

use rp_formats::M4aRom;
use rp_ir::Song;

use crate::LoadError;

/// A numbered collection of songs: a ROM's song table, an SDAT archive,
/// or a plain list built in code.
pub trait SongSource {
    fn song_count(&self) -> usize;

    /// Build song `index`. Out-of-range indices are an error, never a panic.
    fn load(&self, index: usize) -> Result<Song, LoadError>;
}

impl SongSource for M4aRom {
    fn song_count(&self) -> usize {
        M4aRom::song_count(self)
    }

    fn load(&self, index: usize) -> Result<Song, LoadError> {
        Ok(self.load_song(index)?)
    }
}

/// Songs that were already decoded, served by position.
#[derive(Clone, Debug, Default)]
pub struct SongList {
    songs: Vec<Song>,
}

impl SongList {
    pub fn new(songs: Vec<Song>) -> Self {
        Self { songs }
    }

    pub fn push(&mut self, mut song: Song) -> usize {
        song.index = self.songs.len();
        self.songs.push(song);
        self.songs.len() - 1
    }
}

impl SongSource for SongList {
    fn song_count(&self) -> usize {
        self.songs.len()
    }

    fn load(&self, index: usize) -> Result<Song, LoadError> {
        let mut song = self
            .songs
            .get(index)
            .cloned()
            .ok_or(LoadError::IndexOutOfRange { index, count: self.songs.len() })?;
        song.index = index;
        Ok(song)
    }
}

impl From<Vec<Song>> for SongList {
    fn from(songs: Vec<Song>) -> Self {
        Self::new(songs)
    }
}
