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
use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::MissedTickBehavior;
use tracing::{info, span, warn, Level, Span};

use crate::{
    midi::{self, Sequencer},
    player::{Player, PlayerError},
    sequence::Sequence,
};

/// What the transport is doing after a timer tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Playback {
    Stopped,
    Playing,
    /// Playback passed the end of the sequence and was stopped.
    Finished,
}

/// Plays a sequence through a sequencer. Owns the sequence so that the event graph
/// is only touched from the thread driving the timer.
pub struct Transport {
    sequence: Sequence,
    sequencer: Arc<dyn Sequencer>,
    player: Player,
    buffer_quarter_notes: u64,
    playing: bool,
    /// Set when a seek paused playback that should resume on release.
    seek_paused: bool,
    span: Span,
}

impl Transport {
    pub fn new(
        sequence: Sequence,
        sequencer: Arc<dyn Sequencer>,
        buffer_quarter_notes: u64,
    ) -> Transport {
        let player = Player::new(sequence.ppqn(), buffer_quarter_notes);
        Transport {
            sequence,
            sequencer,
            player,
            buffer_quarter_notes,
            playing: false,
            seek_paused: false,
            span: span!(Level::INFO, "transport"),
        }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Starts playback from the play cursor and fills the first window.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        if self.playing {
            return Ok(());
        }

        self.player = Player::new(self.sequence.ppqn(), self.buffer_quarter_notes);
        let offset = self.sequence.play_cursor();
        self.playing = true;
        let result = self
            .player
            .start(&mut self.sequence, self.sequencer.as_ref(), offset)
            .and_then(|_| {
                self.player
                    .refill(&mut self.sequence, self.sequencer.as_ref())
            });
        if let Err(e) = result {
            if let Err(stop_err) = self.halt() {
                warn!(err = %stop_err, "Unable to stop after error.");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stops playback and silences every channel. Stopping while stopped rewinds
    /// to the beginning.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        let span = self.span.clone();
        let _enter = span.enter();

        if !self.playing {
            info!("Rewinding.");
            self.sequencer.set_tick_position(0)?;
            self.sequence.set_play_cursor(0);
            return Ok(());
        }

        self.halt()?;
        info!(
            position = self.position_string(),
            "Stopped playback."
        );
        Ok(())
    }

    /// Moves playback to the tick. Playback is paused until the seek is released.
    pub fn seek(&mut self, tick: u64) -> Result<(), PlayerError> {
        if self.playing {
            self.halt()?;
            self.seek_paused = true;
        }
        self.sequencer.set_tick_position(tick)?;
        self.sequence.set_play_cursor(tick);
        Ok(())
    }

    /// Finishes a seek at the tick, resuming playback if the seek paused it.
    pub fn release_seek(&mut self, tick: u64) -> Result<(), PlayerError> {
        self.sequencer.set_tick_position(tick)?;
        self.sequence.set_play_cursor(tick);
        if self.seek_paused {
            self.seek_paused = false;
            self.play()?;
        }
        Ok(())
    }

    /// Called from the periodic timer: follows the sequencer clock and keeps the
    /// buffer filled.
    pub fn tick(&mut self) -> Result<Playback, PlayerError> {
        if !self.playing {
            return Ok(Playback::Stopped);
        }

        let hw_tick = self.sequencer.tick_position();
        self.sequence.set_play_cursor(hw_tick);
        if hw_tick > self.sequence.length() {
            self.stop()?;
            return Ok(Playback::Finished);
        }

        self.player
            .refill(&mut self.sequence, self.sequencer.as_ref())?;
        Ok(Playback::Playing)
    }

    /// The play cursor in bars and beats.
    pub fn position_string(&self) -> String {
        self.sequence.bar_beat_pulse_str(self.sequence.play_cursor())
    }

    /// Plays until the end of the sequence or until shutdown completes, ticking
    /// every period.
    pub async fn run<F>(&mut self, period: Duration, shutdown: F) -> Result<(), PlayerError>
    where
        F: Future<Output = ()>,
    {
        self.play()?;

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick() {
                        Ok(Playback::Playing) => {}
                        Ok(_) => return Ok(()),
                        Err(e) => {
                            if let Err(stop_err) = self.halt() {
                                warn!(err = %stop_err, "Unable to stop after error.");
                            }
                            return Err(e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Playback interrupted.");
                    return self.stop();
                }
            }
        }
    }

    /// Stops the sequencer where it is, dropping whatever is still queued.
    fn halt(&mut self) -> Result<(), PlayerError> {
        self.playing = false;
        self.sequencer.drop_output()?;
        self.sequencer.stop()?;
        midi::all_sound_off(self.sequencer.as_ref())?;
        self.sequence.set_play_cursor(self.sequencer.tick_position());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{thread, time::Duration};

    use midly::num::{u4, u7};

    use super::*;
    use crate::{
        event::Event,
        midi::{mock, Command, Schedule},
        track::Track,
    };

    fn transport(notes: &[u64]) -> (Transport, mock::Sequencer) {
        let mut sequence = Sequence::with_default_tracks();
        let track = &mut sequence.tracks_mut()[1];
        for start in notes {
            track.add_event(Event::note(
                *start,
                u4::from(0),
                u7::from(60),
                u7::from(100),
                10,
            ));
        }
        let sequencer = mock::Sequencer::get("mock");
        (
            Transport::new(sequence, Arc::new(sequencer.clone()), 4),
            sequencer,
        )
    }

    fn notes(sequencer: &mock::Sequencer) -> Vec<u64> {
        sequencer
            .submitted()
            .into_iter()
            .filter_map(|(schedule, command)| match (schedule, command) {
                (Schedule::Tick(tick), Command::Note { .. }) => Some(tick),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_play_and_stop() {
        let (mut transport, sequencer) = transport(&[0, 500]);
        transport.play().expect("play");
        assert!(transport.is_playing());
        assert!(sequencer.is_running());
        assert_eq!(vec![0], notes(&sequencer));

        sequencer.advance_to(200);
        assert_eq!(Playback::Playing, transport.tick().expect("tick"));
        assert_eq!(200, transport.sequence().play_cursor());
        assert_eq!(vec![0, 500], notes(&sequencer));

        transport.stop().expect("stop");
        assert!(!transport.is_playing());
        assert!(!sequencer.is_running());
        assert_eq!(1, sequencer.dropped());
        assert_eq!(
            16,
            sequencer
                .submitted()
                .iter()
                .filter(|(_, command)| matches!(command, Command::AllSoundOff { .. }))
                .count()
        );
        assert_eq!(200, transport.sequence().play_cursor());
        assert_eq!(Playback::Stopped, transport.tick().expect("tick"));

        // Stopping again rewinds.
        transport.stop().expect("stop");
        assert_eq!(0, transport.sequence().play_cursor());
        assert_eq!(0, sequencer.tick_position());
    }

    #[test]
    fn test_seek_pauses_and_resumes() {
        let (mut transport, sequencer) = transport(&[0, 100, 1000]);
        transport.play().expect("play");
        sequencer.clear_submitted();

        transport.seek(900).expect("seek");
        assert!(!transport.is_playing());
        assert!(!sequencer.is_running());
        assert_eq!(900, sequencer.tick_position());

        sequencer.clear_submitted();
        transport.release_seek(960).expect("release seek");
        assert!(transport.is_playing());
        assert_eq!(960, sequencer.tick_position());
        assert_eq!("3: 3.   0", transport.position_string());
        assert_eq!(vec![1000], notes(&sequencer));
    }

    #[test]
    fn test_seek_backwards_resyncs_pointers() {
        let (mut transport, sequencer) = transport(&[100, 500]);
        transport.play().expect("play");
        sequencer.advance_to(200);
        transport.tick().expect("tick");
        sequencer.advance_to(600);
        transport.tick().expect("tick");
        assert_eq!(vec![100, 500], notes(&sequencer));

        transport.seek(50).expect("seek");
        sequencer.clear_submitted();
        transport.release_seek(50).expect("release seek");
        assert!(transport.is_playing());
        assert_eq!(vec![100], notes(&sequencer));
    }

    #[test]
    fn test_failed_start_halts() {
        let (mut transport, sequencer) = transport(&[0]);
        sequencer.reject_submissions(true);
        assert!(transport.play().is_err());
        assert!(!transport.is_playing());
        assert!(!sequencer.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_fails_on_rejected_submission() {
        let (mut transport, sequencer) = transport(&[0]);
        sequencer.reject_submissions(true);
        assert!(transport
            .run(Duration::from_millis(5), std::future::pending())
            .await
            .is_err());
        assert!(!transport.is_playing());
        assert!(!sequencer.is_running());
    }

    #[test]
    fn test_seek_while_stopped_does_not_play() {
        let (mut transport, sequencer) = transport(&[0]);
        transport.seek(384).expect("seek");
        transport.release_seek(384).expect("release seek");
        assert!(!transport.is_playing());
        assert_eq!(384, transport.sequence().play_cursor());
        assert_eq!("2: 1.   0", transport.position_string());
        assert!(sequencer.submitted().is_empty());
    }

    #[test]
    fn test_finishes_at_end() {
        let (mut transport, sequencer) = transport(&[0]);
        transport.play().expect("play");
        sequencer.advance_to(transport.sequence().length() + 1);
        assert_eq!(Playback::Finished, transport.tick().expect("tick"));
        assert!(!transport.is_playing());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_until_end() {
        let (mut transport, sequencer) = transport(&[0, 100]);
        let length = transport.sequence().length();

        let clock = sequencer.clone();
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            clock.advance_to(length + 1);
        });

        transport
            .run(Duration::from_millis(5), std::future::pending())
            .await
            .expect("run");
        join.join().expect("join");

        assert!(!transport.is_playing());
        assert_eq!(vec![0, 100], notes(&sequencer));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_until_shutdown() {
        let (mut transport, sequencer) = transport(&[0]);
        transport
            .run(
                Duration::from_millis(5),
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await
            .expect("run");
        assert!(!transport.is_playing());
        assert!(!sequencer.is_running());
    }

    #[test]
    fn test_empty_tracks_play() {
        let mut sequence = Sequence::new();
        sequence.add_track(Track::new());
        let sequencer = mock::Sequencer::get("mock");
        let mut transport = Transport::new(sequence, Arc::new(sequencer.clone()), 8);
        transport.play().expect("play");
        assert!(notes(&sequencer).is_empty());
    }
}
