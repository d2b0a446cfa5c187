//! MusicPlayer2000 (M4A/"Sappy") ROM loader.
//!
//! The song table is an array of 8-byte entries pointing at song headers.
//! A header lists the track streams and the voice group (instrument bank)
//! the song plays with. All pointers are GBA bus addresses.

use std::collections::HashMap;
use std::sync::Arc;

use binrw::{io::Cursor, BinRead};
use rp_ir::{
    Adsr, DutyCycle, EngineFormat, Instrument, InstrumentBank, KeyRegion, NoiseMode, Program,
    PsgChannel, Sample, SampleKey, Song, TrackSource, VoiceSource,
};

use crate::FormatError;

/// Bus address of ROM byte 0.
pub const GBA_ROM_BASE: u32 = 0x0800_0000;
/// Largest cartridge the bus maps (32 MiB).
pub const GBA_ROM_CAPACITY: u32 = 0x0200_0000;

const TITLE_OFFSET: usize = 0xA0;
const GAME_CODE_OFFSET: usize = 0xAC;

const MAX_SONGS: usize = 2048;
const SONG_ENTRY_SIZE: usize = 8;
const VOICE_GROUP_SIZE: usize = 128;
const VOICE_ENTRY_SIZE: usize = 12;
const SAMPLE_HEADER_SIZE: usize = 16;
const WAVE_BYTES: usize = 16;

const FIXED_PITCH: u8 = 0x08;
const KEY_SPLIT: u8 = 0x40;
const DRUMKIT: u8 = 0x80;
const SAMPLE_LOOPED: u32 = 0x4000_0000;

/// One song table row.
#[derive(BinRead, Clone, Copy, Debug, PartialEq, Eq)]
#[br(little)]
pub struct SongTableEntry {
    /// Song header address
    pub header: u32,
    /// Music player (output group) the song runs on
    pub player: u16,
    pub unknown: u16,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct SongHeader {
    track_count: u8,
    block_count: u8,
    priority: u8,
    reverb: u8,
    voice_group: u32,
    #[br(count = track_count)]
    tracks: Vec<u32>,
}

#[derive(BinRead, Clone, Copy, Debug)]
#[br(little)]
struct VoiceEntry {
    kind: u8,
    base_key: u8,
    _reserved: u8,
    pan_sweep: u8,
    /// Sample, wave or sub-group address; duty or noise period for PSG
    data: u32,
    attack: u8,
    decay: u8,
    sustain: u8,
    release: u8,
}

impl VoiceEntry {
    /// Key-split entries keep the key map address where the envelope goes.
    fn key_map(&self) -> u32 {
        u32::from_le_bytes([self.attack, self.decay, self.sustain, self.release])
    }

    fn adsr(&self) -> Adsr {
        Adsr::new(self.attack, self.decay, self.sustain, self.release)
    }
}

#[derive(BinRead, Debug)]
#[br(little)]
struct SampleHeader {
    flags: u32,
    /// Rate in Hz * 1024
    pitch: u32,
    loop_start: u32,
    length: u32,
}

/// A GBA ROM image with an M4A song table.
#[derive(Clone, Debug)]
pub struct M4aRom {
    data: Arc<[u8]>,
    table_offset: usize,
    songs: Vec<SongTableEntry>,
}

impl M4aRom {
    /// Open `data` with the song table at `table` (bus address or file
    /// offset). Entries are read until the first one whose header pointer
    /// leaves the image.
    pub fn new(data: impl Into<Arc<[u8]>>, table: u32) -> Result<Self, FormatError> {
        let data = data.into();
        let mut rom = Self { data, table_offset: 0, songs: Vec::new() };
        rom.table_offset = rom.address_offset(table)?;

        let mut offset = rom.table_offset;
        while rom.songs.len() < MAX_SONGS {
            let Ok(entry) = rom.read_song_entry(offset) else {
                break;
            };
            if rom.pointer_offset(entry.header).is_err() {
                break;
            }
            rom.songs.push(entry);
            offset += SONG_ENTRY_SIZE;
        }
        if rom.songs.is_empty() {
            return Err(FormatError::EmptySongTable);
        }

        tracing::debug!(
            table = rom.table_offset,
            songs = rom.songs.len(),
            game = rom.game_code().unwrap_or("????"),
            "song table read"
        );
        Ok(rom)
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn table_offset(&self) -> usize {
        self.table_offset
    }

    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    pub fn songs(&self) -> &[SongTableEntry] {
        &self.songs
    }

    /// Four-character game code from the cartridge header.
    pub fn game_code(&self) -> Option<&str> {
        let bytes = self.data.get(GAME_CODE_OFFSET..GAME_CODE_OFFSET + 4)?;
        std::str::from_utf8(bytes).ok()
    }

    /// Internal title from the cartridge header.
    pub fn title(&self) -> Option<&str> {
        let bytes = self.data.get(TITLE_OFFSET..TITLE_OFFSET + 12)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end]).ok()
    }

    /// Number of tracks in song `index`.
    pub fn track_count(&self, index: usize) -> Result<usize, FormatError> {
        Ok(self.song_header(index)?.tracks.len())
    }

    /// Load song `index` with its voice group.
    pub fn load_song(&self, index: usize) -> Result<Song, FormatError> {
        let header = self.song_header(index)?;
        let bank = self.load_voice_group(header.voice_group)?;

        let mut song = Song::new(EngineFormat::M4a, bank);
        song.index = index;
        for &pointer in &header.tracks {
            let start = self.pointer_offset(pointer)?;
            song.add_track(TrackSource::shared(Arc::clone(&self.data), GBA_ROM_BASE, start as u32));
        }

        tracing::debug!(
            index,
            tracks = header.track_count,
            blocks = header.block_count,
            priority = header.priority,
            reverb = header.reverb,
            "song header read"
        );
        Ok(song)
    }

    fn song_header(&self, index: usize) -> Result<SongHeader, FormatError> {
        let entry = self.songs.get(index).ok_or(FormatError::SongIndexOutOfRange {
            index,
            count: self.songs.len(),
        })?;
        let offset = self.pointer_offset(entry.header)?;
        Ok(SongHeader::read(&mut self.cursor_at(offset)?)?)
    }

    fn read_song_entry(&self, offset: usize) -> Result<SongTableEntry, FormatError> {
        Ok(SongTableEntry::read(&mut self.cursor_at(offset)?)?)
    }

    fn read_voice_entry(&self, offset: usize) -> Result<VoiceEntry, FormatError> {
        Ok(VoiceEntry::read(&mut self.cursor_at(offset)?)?)
    }

    fn cursor_at(&self, offset: usize) -> Result<Cursor<&[u8]>, FormatError> {
        let bytes = self.data.get(offset..).ok_or(FormatError::UnexpectedEof { offset })?;
        Ok(Cursor::new(bytes))
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], FormatError> {
        self.data
            .get(offset..offset + len)
            .ok_or(FormatError::UnexpectedEof { offset: offset + len })
    }

    /// File offset of a bus pointer stored in the image.
    fn pointer_offset(&self, pointer: u32) -> Result<usize, FormatError> {
        let in_rom = pointer
            .checked_sub(GBA_ROM_BASE)
            .filter(|&off| off < GBA_ROM_CAPACITY && (off as usize) < self.data.len());
        in_rom.map(|off| off as usize).ok_or(FormatError::InvalidPointer { pointer })
    }

    /// File offset of a user-supplied address: a bus pointer or a plain offset.
    fn address_offset(&self, address: u32) -> Result<usize, FormatError> {
        if address < GBA_ROM_CAPACITY && (address as usize) < self.data.len() {
            return Ok(address as usize);
        }
        self.pointer_offset(address)
    }

    fn load_voice_group(&self, voice_group: u32) -> Result<InstrumentBank, FormatError> {
        let base = self.pointer_offset(voice_group)?;
        let mut loader =
            BankLoader { rom: self, bank: InstrumentBank::new(), samples: HashMap::new() };
        for program in 0..VOICE_GROUP_SIZE {
            let Ok(entry) = self.read_voice_entry(base + program * VOICE_ENTRY_SIZE) else {
                break;
            };
            match loader.program(&entry) {
                Ok(Some(p)) => loader.bank.set_program(program as u8, p),
                Ok(None) => {}
                Err(error) => tracing::debug!(program, %error, "voice skipped"),
            }
        }
        Ok(loader.bank)
    }
}

/// Builds one voice group, sharing samples referenced more than once.
struct BankLoader<'a> {
    rom: &'a M4aRom,
    bank: InstrumentBank,
    samples: HashMap<u32, SampleKey>,
}

impl BankLoader<'_> {
    fn program(&mut self, entry: &VoiceEntry) -> Result<Option<Program>, FormatError> {
        match entry.kind {
            KEY_SPLIT => self.key_split(entry),
            DRUMKIT => self.drumkit(entry),
            _ => Ok(self.instrument(entry)?.map(Program::Single)),
        }
    }

    fn instrument(&mut self, entry: &VoiceEntry) -> Result<Option<Instrument>, FormatError> {
        if entry.kind & (KEY_SPLIT | DRUMKIT) != 0 {
            return Ok(None);
        }
        let inst = match entry.kind & 0x07 {
            0 => {
                let key = self.pcm_sample(entry.data)?;
                let mut inst =
                    Instrument::new("direct", VoiceSource::Pcm(key)).with_adsr(entry.adsr());
                if entry.kind & FIXED_PITCH != 0 {
                    let root = inst.root_key;
                    inst = inst.fixed_at(root);
                }
                inst.pan = direct_pan(entry.pan_sweep);
                inst
            }
            1 => Instrument::new("square1", VoiceSource::Square(duty(entry)))
                .on_psg(PsgChannel::Square1)
                .with_adsr(psg_adsr(entry)),
            2 => Instrument::new("square2", VoiceSource::Square(duty(entry)))
                .on_psg(PsgChannel::Square2)
                .with_adsr(psg_adsr(entry)),
            3 => {
                let key = self.wave_sample(entry.data)?;
                Instrument::new("wave", VoiceSource::Wave(key))
                    .on_psg(PsgChannel::Wave)
                    .with_adsr(psg_adsr(entry))
            }
            4 => {
                let mode = if entry.data & 1 != 0 { NoiseMode::Short } else { NoiseMode::Long };
                Instrument::new("noise", VoiceSource::Noise(mode))
                    .on_psg(PsgChannel::Noise)
                    .with_adsr(psg_adsr(entry))
            }
            _ => return Ok(None),
        };
        Ok(Some(inst))
    }

    /// Sub-group entry `index`, skipping anything unreadable.
    fn sub_instrument(&mut self, group: usize, index: usize) -> Option<(VoiceEntry, Instrument)> {
        let entry = self.rom.read_voice_entry(group + index * VOICE_ENTRY_SIZE).ok()?;
        let inst = self.instrument(&entry).ok()??;
        Some((entry, inst))
    }

    fn key_split(&mut self, entry: &VoiceEntry) -> Result<Option<Program>, FormatError> {
        let group = self.rom.pointer_offset(entry.data)?;
        let map_offset = self.rom.pointer_offset(entry.key_map())?;
        let map = self.rom.bytes(map_offset, 128)?.to_vec();

        let mut regions = Vec::new();
        for key in 0..128usize {
            let index = map[key];
            if key < 127 && map[key + 1] == index {
                continue;
            }
            if let Some((_, instrument)) = self.sub_instrument(group, index as usize) {
                regions.push(KeyRegion { high_key: key as u8, instrument });
            }
        }
        Ok((!regions.is_empty()).then_some(Program::KeySplit(regions)))
    }

    fn drumkit(&mut self, entry: &VoiceEntry) -> Result<Option<Program>, FormatError> {
        let group = self.rom.pointer_offset(entry.data)?;
        let kit: Vec<Option<Instrument>> = (0..128)
            .map(|key| {
                self.sub_instrument(group, key)
                    .map(|(sub, inst)| inst.fixed_at(sub.base_key))
            })
            .collect();
        if kit.iter().all(Option::is_none) {
            return Ok(None);
        }
        Ok(Some(Program::Drumkit(kit)))
    }

    fn pcm_sample(&mut self, pointer: u32) -> Result<SampleKey, FormatError> {
        if let Some(&key) = self.samples.get(&pointer) {
            return Ok(key);
        }
        let offset = self.rom.pointer_offset(pointer)?;
        let header = SampleHeader::read(&mut self.rom.cursor_at(offset)?)?;
        let body = self.rom.bytes(offset + SAMPLE_HEADER_SIZE, header.length as usize)?;

        let pcm: Vec<i8> = body.iter().map(|&b| b as i8).collect();
        let mut sample = Sample::pcm8("pcm", pcm, header.pitch / 1024);
        if header.flags & SAMPLE_LOOPED != 0 {
            sample = sample.with_loop(header.loop_start);
        }
        let key = self.bank.add_sample(sample);
        self.samples.insert(pointer, key);
        Ok(key)
    }

    fn wave_sample(&mut self, pointer: u32) -> Result<SampleKey, FormatError> {
        if let Some(&key) = self.samples.get(&pointer) {
            return Ok(key);
        }
        let offset = self.rom.pointer_offset(pointer)?;
        let wave = decode_wave(self.rom.bytes(offset, WAVE_BYTES)?);
        let key = self.bank.add_sample(Sample::pcm8("wave", wave, 0).with_loop(0));
        self.samples.insert(pointer, key);
        Ok(key)
    }
}

/// Direct-sound pan byte: bit 7 enables, low bits are centred on 0x40.
fn direct_pan(pan: u8) -> Option<i8> {
    (pan & 0x80 != 0).then(|| ((pan & 0x7F) as i16 - 0x40) as i8)
}

/// Square channel duty from the low bits of the entry data.
fn duty(entry: &VoiceEntry) -> DutyCycle {
    DutyCycle::from_bits(entry.data as u8)
}

/// PSG envelopes count 0-7 (0-15 for sustain) in frames per level. This
/// maps them onto the linear direct-sound model.
fn psg_adsr(entry: &VoiceEntry) -> Adsr {
    let attack = match entry.attack & 7 {
        0 => 255,
        a => 17 / a,
    };
    let fall = |rate: u8| match rate & 7 {
        0 => 0,
        r => 256u16.saturating_sub(32 / r as u16).min(255) as u8,
    };
    Adsr::new(attack, fall(entry.decay), (entry.sustain & 15) * 17, fall(entry.release))
}

/// 4-bit programmable wave RAM, high nibble first.
fn decode_wave(bytes: &[u8]) -> Vec<i8> {
    bytes
        .iter()
        .flat_map(|&b| [b >> 4, b & 0x0F])
        .map(|n| ((n as i8) - 8) * 16)
        .collect()
}
