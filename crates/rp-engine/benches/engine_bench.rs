use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rp_engine::{EngineConfig, Frame, Sequencer};
use rp_ir::{
    DutyCycle, EngineFormat, Instrument, InstrumentBank, Program, Sample, Song, TrackSource,
    VoiceSource,
};

const SAMPLE_RATE: u32 = 48000;

/// Eight tracks, each holding a chord note and looping forever.
fn busy_song() -> Song {
    let mut bank = InstrumentBank::new();
    let wave: Vec<i8> = (0..256).map(|i| ((i as f32 / 40.0).sin() * 100.0) as i8).collect();
    let key = bank.add_sample(Sample::pcm8("sine", wave, 13379).with_loop(0));
    bank.set_program(0, Program::Single(Instrument::new("pcm", VoiceSource::Pcm(key))));
    bank.set_program(
        1,
        Program::Single(Instrument::new("sq", VoiceSource::Square(DutyCycle::Quarter))),
    );

    let mut song = Song::new(EngineFormat::M4a, bank).with_tempo(150);
    for t in 0..8u8 {
        // VOICE, N24 key v127, W24, GOTO 0
        let mut data = vec![0xBD, t % 2, 0xE7, 48 + t * 3, 127, 0x98, 0xB2];
        data.extend_from_slice(&0u32.to_le_bytes());
        song.add_track(TrackSource::from_bytes(&data));
    }
    song
}

fn bench_render(c: &mut Criterion) {
    let song = busy_song();
    let mut seq = Sequencer::new(EngineConfig::default().with_sample_rate(SAMPLE_RATE));
    seq.load(&song).unwrap();
    seq.play();
    let mut buffer = vec![Frame::silence(); 1024];

    c.bench_function("render_1024_frames_8_tracks", |b| {
        b.iter(|| {
            seq.advance(black_box(&mut buffer));
        })
    });
}

fn bench_interleaved(c: &mut Criterion) {
    let song = busy_song();
    let mut seq = Sequencer::new(EngineConfig::default());
    seq.load(&song).unwrap();
    seq.play();
    let mut buffer = vec![0i16; 2048];

    c.bench_function("render_interleaved_1024_frames", |b| {
        b.iter(|| {
            seq.advance_interleaved(black_box(&mut buffer));
        })
    });
}

criterion_group!(benches, bench_render, bench_interleaved);
criterion_main!(benches);
