//! Loader tests against a small hand-assembled ROM image.

use rp_formats::{FormatError, M4aRom, GBA_ROM_BASE};
use rp_ir::{DutyCycle, EngineFormat, NoiseMode, PsgChannel, VoiceSource};

const ROM_SIZE: usize = 0x1100;
const SONG_TABLE: usize = 0x100;
const VOICE_GROUP: usize = 0x300;
const KEY_MAP: usize = 0xF00;
const PCM_SAMPLE: usize = 0x1000;
const WAVE: usize = 0x1040;

fn ptr(offset: usize) -> [u8; 4] {
    (GBA_ROM_BASE + offset as u32).to_le_bytes()
}

fn put(rom: &mut [u8], offset: usize, bytes: &[u8]) {
    rom[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn voice(rom: &mut [u8], index: usize, head: [u8; 4], data: [u8; 4], tail: [u8; 4]) {
    let at = VOICE_GROUP + index * 12;
    put(rom, at, &head);
    put(rom, at + 4, &data);
    put(rom, at + 8, &tail);
}

/// Two songs sharing one voice group with every voice kind.
fn build_rom() -> Vec<u8> {
    let mut rom = vec![0u8; ROM_SIZE];
    put(&mut rom, 0xA0, b"RETROPLAYTST");
    put(&mut rom, 0xAC, b"RPTE");

    // song table, terminated by a null entry
    put(&mut rom, SONG_TABLE, &ptr(0x200));
    put(&mut rom, SONG_TABLE + 8, &ptr(0x240));

    // song 0: two tracks
    put(&mut rom, 0x200, &[2, 0, 0, 0]);
    put(&mut rom, 0x204, &ptr(VOICE_GROUP));
    put(&mut rom, 0x208, &ptr(0x280));
    put(&mut rom, 0x20C, &ptr(0x290));
    // song 1: one looping track
    put(&mut rom, 0x240, &[1, 0, 0, 0]);
    put(&mut rom, 0x244, &ptr(VOICE_GROUP));
    put(&mut rom, 0x248, &ptr(0x2A0));

    put(&mut rom, 0x280, &[0xBD, 0, 0xCF, 60, 100, 0x84, 0xCE, 0xB1]);
    put(&mut rom, 0x290, &[0xBD, 1, 0xCF, 64, 80, 0x88, 0xCE, 0xB1]);
    put(&mut rom, 0x2A0, &[0x81, 0xB2]);
    put(&mut rom, 0x2A2, &ptr(0x2A0));

    voice(&mut rom, 0, [0x00, 60, 0, 0xD0], ptr(PCM_SAMPLE), [255, 0, 255, 0]);
    voice(&mut rom, 1, [0x01, 72, 0, 0], [2, 0, 0, 0], [0, 0, 15, 0]);
    voice(&mut rom, 2, [0x40, 0, 0, 0], ptr(VOICE_GROUP), ptr(KEY_MAP));
    voice(&mut rom, 3, [0x80, 0, 0, 0], ptr(VOICE_GROUP), [0; 4]);
    voice(&mut rom, 4, [0x03, 60, 0, 0], ptr(WAVE), [0, 0, 15, 0]);
    voice(&mut rom, 5, [0x04, 60, 0, 0], [1, 0, 0, 0], [0, 0, 15, 0]);
    voice(&mut rom, 6, [0x08, 48, 0, 0], ptr(PCM_SAMPLE), [255, 0, 255, 0]);

    // keys below 60 use voice 0, the rest voice 1
    for key in 0..128 {
        rom[KEY_MAP + key] = if key < 60 { 0 } else { 1 };
    }

    put(&mut rom, PCM_SAMPLE, &0x4000_0000u32.to_le_bytes());
    put(&mut rom, PCM_SAMPLE + 4, &(13379u32 * 1024).to_le_bytes());
    put(&mut rom, PCM_SAMPLE + 8, &4u32.to_le_bytes());
    put(&mut rom, PCM_SAMPLE + 12, &32u32.to_le_bytes());
    for i in 0..32 {
        rom[PCM_SAMPLE + 16 + i] = (i as u8).wrapping_mul(8);
    }
    for i in 0..16 {
        rom[WAVE + i] = 0x0F;
    }
    rom
}

fn open() -> M4aRom {
    M4aRom::new(build_rom(), GBA_ROM_BASE + SONG_TABLE as u32).unwrap()
}

#[test]
fn reads_header_and_song_table() {
    let rom = open();
    assert_eq!(rom.song_count(), 2);
    assert_eq!(rom.game_code(), Some("RPTE"));
    assert_eq!(rom.title(), Some("RETROPLAYTST"));
    assert_eq!(rom.table_offset(), SONG_TABLE);
    assert_eq!(rom.track_count(0).unwrap(), 2);
    assert_eq!(rom.track_count(1).unwrap(), 1);
}

#[test]
fn table_address_may_be_a_file_offset() {
    let rom = M4aRom::new(build_rom(), SONG_TABLE as u32).unwrap();
    assert_eq!(rom.song_count(), 2);
}

#[test]
fn empty_table_is_an_error() {
    let err = M4aRom::new(build_rom(), 0x1080).unwrap_err();
    assert_eq!(err, FormatError::EmptySongTable);
}

#[test]
fn song_index_out_of_range() {
    let err = open().load_song(5).unwrap_err();
    assert_eq!(err, FormatError::SongIndexOutOfRange { index: 5, count: 2 });
}

#[test]
fn song_tracks_point_into_shared_image() {
    let rom = open();
    let song = rom.load_song(0).unwrap();
    assert_eq!(song.index, 0);
    assert_eq!(song.format, EngineFormat::M4a);
    assert_eq!(song.tracks.len(), 2);
    assert_eq!(song.tracks[0].start, 0x280);
    assert_eq!(song.tracks[1].start, 0x290);
    assert_eq!(song.tracks[0].base_address, GBA_ROM_BASE);
    assert_eq!(song.tracks[0].data.len(), ROM_SIZE);
}

#[test]
fn direct_sound_voice() {
    let song = open().load_song(0).unwrap();
    let (inst, key) = song.bank.resolve(0, 50).unwrap();
    assert_eq!(key, 50);
    assert_eq!(inst.pan, Some(16));
    let VoiceSource::Pcm(sample_key) = inst.source else {
        panic!("expected pcm, got {:?}", inst.source);
    };
    let sample = song.bank.sample(sample_key).unwrap();
    assert_eq!(sample.rate, 13379);
    assert_eq!(sample.len(), 32);
    assert!(sample.has_loop());
    assert_eq!(sample.loop_start, 4);
}

#[test]
fn samples_are_shared_between_voices() {
    let song = open().load_song(0).unwrap();
    // one pcm sample (voices 0 and 6) plus the wave
    assert_eq!(song.bank.samples.len(), 2);
    let (fixed, key) = song.bank.resolve(6, 90).unwrap();
    assert_eq!(fixed.fixed_key, Some(60));
    assert_eq!(key, 60);
}

#[test]
fn psg_voices() {
    let song = open().load_song(0).unwrap();
    let (square, _) = song.bank.resolve(1, 60).unwrap();
    assert_eq!(square.source, VoiceSource::Square(DutyCycle::Half));
    assert_eq!(square.psg_channel, Some(PsgChannel::Square1));
    assert_eq!(square.adsr.attack, 255);

    let (wave, _) = song.bank.resolve(4, 60).unwrap();
    assert_eq!(wave.psg_channel, Some(PsgChannel::Wave));
    let VoiceSource::Wave(wave_key) = wave.source else {
        panic!("expected wave");
    };
    assert_eq!(song.bank.sample(wave_key).unwrap().len(), 32);

    let (noise, _) = song.bank.resolve(5, 60).unwrap();
    assert_eq!(noise.source, VoiceSource::Noise(NoiseMode::Short));
}

#[test]
fn key_split_follows_key_map() {
    let song = open().load_song(0).unwrap();
    let (low, _) = song.bank.resolve(2, 40).unwrap();
    assert!(matches!(low.source, VoiceSource::Pcm(_)));
    let (high, _) = song.bank.resolve(2, 80).unwrap();
    assert!(matches!(high.source, VoiceSource::Square(_)));
}

#[test]
fn drumkit_plays_each_entry_at_its_base_key() {
    let song = open().load_song(0).unwrap();
    let (kick, key) = song.bank.resolve(3, 0).unwrap();
    assert!(matches!(kick.source, VoiceSource::Pcm(_)));
    assert_eq!(key, 60);
    let (_, key) = song.bank.resolve(3, 1).unwrap();
    assert_eq!(key, 72);
    // nested split and empty slots are not playable drums
    assert!(song.bank.resolve(3, 2).is_none());
    assert!(song.bank.resolve(3, 100).is_none());
}

#[test]
fn unreadable_voices_are_skipped() {
    let song = open().load_song(1).unwrap();
    assert!(song.bank.program(7).is_none());
    assert!(song.bank.program(0).is_some());
}
