//! Decoded event-stream commands.
//!
//! Every format's opcode table decodes into this one vocabulary. Offsets are
//! byte offsets into the track's event stream, already translated from the
//! format's own addressing (GBA pointers, relative jumps, SSEQ offsets).

/// ADSR parameter targeted by an envelope override.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeParam {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// One decoded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start a note. `duration` in ticks; `None` holds until `NoteOff`.
    NoteOn {
        key: u8,
        velocity: u8,
        duration: Option<u32>,
    },
    /// Release held notes (all of them when `key` is `None`).
    NoteOff { key: Option<u8> },
    /// Select a program from the instrument bank.
    SetInstrument(u8),
    /// Track volume (0-127).
    SetVolume(u8),
    /// Track expression (0-127), multiplied with volume.
    SetExpression(u8),
    /// Pan (-64 left .. 63 right).
    SetPan(i8),
    /// Pitch bend, normalized to -8192..=8191 of the bend range.
    PitchBend(i16),
    /// Pitch bend range in semitones.
    BendRange(u8),
    /// Transpose subsequent notes by semitones.
    Transpose(i8),
    /// Tempo in BPM.
    Tempo(u16),
    /// Yield for this many ticks.
    Wait(u32),
    /// Move the cursor.
    Jump(u32),
    /// Play the body at `target` `count` times (forever when `None`), then
    /// continue after this command.
    Loop { target: u32, count: Option<u8> },
    /// End of one body pass started by `Loop`.
    Return,
    /// Jump back to `target` until this command has been reached `count`
    /// times, then continue after it.
    Repeat { target: u32, count: u8 },
    /// Mark the start of an in-place loop (forever when `None`).
    LoopStart(Option<u8>),
    /// Jump back to the innermost `LoopStart` until its count is used up.
    LoopEnd,
    /// Song loop point for formats that mark one.
    LoopPoint,
    /// Override one ADSR parameter for notes started afterwards.
    Envelope(EnvelopeParam, u8),
    /// Recognized opcode with no audible effect here.
    Nop,
    /// Track is done.
    EndOfTrack,
}

