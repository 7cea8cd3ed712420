use anyhow::Result;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{debug, info};

use crate::metrics;
use crate::models::{MiniUser, Story};
use crate::stories::StoryService;

pub const DEFAULT_STORY_DURATION: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub author_index: usize,
    pub story_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Image not ready yet, no timer.
    Loading,
    /// Image shown, auto-advance timer running.
    Playing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved(Position),
    Stayed,
    Closed,
}

/// Two-level cursor over authors and each author's stories.
///
/// Stories are bucketed per author and sorted oldest first once, at
/// construction; the order never changes for the life of the session.
#[derive(Debug)]
pub struct StoryPlayback {
    authors: Vec<MiniUser>,
    stories: Vec<Vec<Story>>,
    position: Position,
    phase: PlaybackPhase,
}

impl StoryPlayback {
    pub fn new(stories: &[Story], authors: Vec<MiniUser>, initial_author_index: usize) -> Self {
        let buckets: Vec<Vec<Story>> = {
            let mut by_author: HashMap<&str, Vec<Story>> = authors
                .iter()
                .map(|a| (a.id.as_str(), Vec::new()))
                .collect();
            for story in stories {
                if let Some(bucket) = by_author.get_mut(story.by.id.as_str()) {
                    bucket.push(story.clone());
                }
            }

            authors
                .iter()
                .map(|a| {
                    let mut bucket = by_author.remove(a.id.as_str()).unwrap_or_default();
                    bucket.sort_by(|x, y| x.created_at.cmp(&y.created_at));
                    bucket
                })
                .collect()
        };

        let mut playback = Self {
            authors,
            stories: buckets,
            position: Position {
                author_index: initial_author_index,
                story_index: 0,
            },
            phase: PlaybackPhase::Loading,
        };
        if playback.current_story().is_none() {
            playback.phase = PlaybackPhase::Closed;
        }
        playback
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == PlaybackPhase::Closed
    }

    pub fn position(&self) -> Option<Position> {
        (!self.is_closed()).then_some(self.position)
    }

    pub fn current_author(&self) -> Option<&MiniUser> {
        self.authors.get(self.position.author_index)
    }

    pub fn current_story(&self) -> Option<&Story> {
        self.stories
            .get(self.position.author_index)?
            .get(self.position.story_index)
    }

    /// The current author's stories in playback order.
    pub fn author_stories(&self) -> &[Story] {
        self.stories
            .get(self.position.author_index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn next(&mut self) -> Transition {
        if self.is_closed() {
            return Transition::Closed;
        }

        let Position {
            author_index,
            story_index,
        } = self.position;

        if story_index + 1 < self.author_stories().len() {
            self.enter(Position {
                author_index,
                story_index: story_index + 1,
            })
        } else if author_index + 1 < self.authors.len() {
            self.enter(Position {
                author_index: author_index + 1,
                story_index: 0,
            })
        } else {
            self.close();
            Transition::Closed
        }
    }

    pub fn previous(&mut self) -> Transition {
        if self.is_closed() {
            return Transition::Closed;
        }

        let Position {
            author_index,
            story_index,
        } = self.position;

        if story_index > 0 {
            self.enter(Position {
                author_index,
                story_index: story_index - 1,
            })
        } else if author_index > 0 {
            let last = self.stories[author_index - 1].len().saturating_sub(1);
            self.enter(Position {
                author_index: author_index - 1,
                story_index: last,
            })
        } else {
            Transition::Stayed
        }
    }

    /// Loading to playing, only for the story on screen. Returns whether the
    /// auto-advance timer should start.
    pub fn image_ready(&mut self, story_id: &str) -> bool {
        if self.phase != PlaybackPhase::Loading {
            return false;
        }
        match self.current_story() {
            Some(story) if story.id == story_id => {
                self.phase = PlaybackPhase::Playing;
                true
            }
            _ => false,
        }
    }

    /// Returns `false` if the session was already closed.
    pub fn close(&mut self) -> bool {
        let was_open = !self.is_closed();
        self.phase = PlaybackPhase::Closed;
        was_open
    }

    fn enter(&mut self, position: Position) -> Transition {
        self.position = position;
        if self.current_story().is_none() {
            // An author without stories has nothing to show
            self.close();
            return Transition::Closed;
        }
        self.phase = PlaybackPhase::Loading;
        Transition::Moved(position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerCommand {
    Next,
    Previous,
    ImageReady { story_id: String },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Position {
        position: Position,
        author_id: String,
        story_id: String,
    },
    Closed,
}

/// The single pending auto-advance deadline, if any.
#[derive(Default)]
struct AutoAdvanceTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl AutoAdvanceTimer {
    fn schedule(&mut self, duration: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep(duration)));
    }

    // Safe to call with nothing pending
    fn cancel(&mut self) {
        self.sleep = None;
    }

    fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}

struct StoryViewer {
    playback: StoryPlayback,
    stories: StoryService,
    viewer_id: String,
    duration: Duration,
    events: mpsc::Sender<ViewerEvent>,
    timer: AutoAdvanceTimer,
}

impl StoryViewer {
    /// Report the position just entered and record the view. Returns `false`
    /// once the caller is gone.
    async fn announce(&mut self) -> bool {
        let (Some(position), Some(author), Some(story)) = (
            self.playback.position(),
            self.playback.current_author(),
            self.playback.current_story(),
        ) else {
            return false;
        };
        let author_id = author.id.clone();
        let story_id = story.id.clone();

        self.stories
            .mark_story_viewed(&story_id, &self.viewer_id)
            .await;

        debug!(
            author_index = position.author_index,
            story_index = position.story_index,
            story_id = %story_id,
            "Showing story"
        );

        self.events
            .send(ViewerEvent::Position {
                position,
                author_id,
                story_id,
            })
            .await
            .is_ok()
    }

    /// Apply a navigation result. Returns whether the session goes on.
    async fn apply(&mut self, transition: Transition) -> bool {
        match transition {
            Transition::Moved(_) => self.announce().await,
            Transition::Stayed => {
                if self.playback.phase() == PlaybackPhase::Playing {
                    self.timer.schedule(self.duration);
                }
                true
            }
            Transition::Closed => false,
        }
    }

    async fn handle(&mut self, command: ViewerCommand) -> bool {
        match command {
            ViewerCommand::Next => {
                self.timer.cancel();
                let transition = self.playback.next();
                self.apply(transition).await
            }
            ViewerCommand::Previous => {
                self.timer.cancel();
                let transition = self.playback.previous();
                self.apply(transition).await
            }
            ViewerCommand::ImageReady { story_id } => {
                if self.playback.image_ready(&story_id) {
                    self.timer.schedule(self.duration);
                    debug!(story_id = %story_id, "Image ready, auto-advance armed");
                }
                true
            }
            ViewerCommand::Close => {
                self.timer.cancel();
                self.playback.close();
                false
            }
        }
    }
}

/// Drive one story viewer session until it closes.
///
/// Commands come from the caller; position changes and the final `Closed`
/// go back on `events`. Dropping the command sender closes the session.
pub async fn run_story_viewer(
    playback: StoryPlayback,
    mut commands: mpsc::Receiver<ViewerCommand>,
    events: mpsc::Sender<ViewerEvent>,
    stories: StoryService,
    viewer_id: String,
    duration: Duration,
) -> Result<()> {
    info!(viewer_id = %viewer_id, "Starting story viewer");

    let mut viewer = StoryViewer {
        playback,
        stories,
        viewer_id,
        duration,
        events,
        timer: AutoAdvanceTimer::default(),
    };

    let mut running = !viewer.playback.is_closed() && viewer.announce().await;

    while running {
        tokio::select! {
            command = commands.recv() => {
                running = match command {
                    Some(command) => viewer.handle(command).await,
                    None => false,
                };
            }
            () = viewer.timer.expired(), if viewer.timer.is_pending() => {
                viewer.timer.cancel();
                metrics::STORY_AUTO_ADVANCES.inc();
                let transition = viewer.playback.next();
                running = viewer.apply(transition).await;
            }
        }
    }

    viewer.timer.cancel();
    viewer.playback.close();
    // The caller may already be gone
    let _ = viewer.events.send(ViewerEvent::Closed).await;

    info!(viewer_id = %viewer.viewer_id, "Story viewer closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn author(id: &str) -> MiniUser {
        MiniUser {
            id: id.to_string(),
            username: id.to_string(),
            fullname: None,
            img_url: format!("https://img.test/{}.png", id),
        }
    }

    fn story(id: &str, by: &str, minutes: i64) -> Story {
        Story {
            id: id.to_string(),
            img_url: format!("https://img.test/{}.jpg", id),
            txt: None,
            by: author(by),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
                + ChronoDuration::minutes(minutes),
            viewed_by: Vec::new(),
            expires_at: None,
        }
    }

    fn pos(author_index: usize, story_index: usize) -> Position {
        Position {
            author_index,
            story_index,
        }
    }

    // A has two stories stored newest first, B has one
    fn two_authors() -> (Vec<Story>, Vec<MiniUser>) {
        (
            vec![story("a2", "a", 10), story("b1", "b", 5), story("a1", "a", 1)],
            vec![author("a"), author("b")],
        )
    }

    #[test]
    fn test_next_walks_stories_then_authors_then_closes() {
        let (stories, authors) = two_authors();
        let mut playback = StoryPlayback::new(&stories, authors, 0);

        assert_eq!(playback.current_story().unwrap().id, "a1");
        assert_eq!(playback.next(), Transition::Moved(pos(0, 1)));
        assert_eq!(playback.current_story().unwrap().id, "a2");
        assert_eq!(playback.next(), Transition::Moved(pos(1, 0)));
        assert_eq!(playback.next(), Transition::Closed);
        assert!(playback.is_closed());
        assert_eq!(playback.position(), None);
    }

    #[test]
    fn test_next_count_matches_total_stories() {
        let authors = vec![author("a"), author("b"), author("c")];
        let counts = [3usize, 1, 2];
        let mut stories = Vec::new();
        for (a, count) in authors.iter().zip(counts) {
            for i in 0..count {
                stories.push(story(&format!("{}{}", a.id, i), &a.id, i as i64));
            }
        }

        let mut playback = StoryPlayback::new(&stories, authors, 0);
        let total: usize = counts.iter().sum();
        for call in 1..=total {
            let transition = playback.next();
            if call < total {
                assert!(matches!(transition, Transition::Moved(_)), "call {}", call);
            } else {
                assert_eq!(transition, Transition::Closed);
            }
        }
    }

    #[test]
    fn test_previous_at_start_is_a_no_op() {
        let (stories, authors) = two_authors();
        let mut playback = StoryPlayback::new(&stories, authors, 0);

        for _ in 0..5 {
            assert_eq!(playback.previous(), Transition::Stayed);
            assert_eq!(playback.position(), Some(pos(0, 0)));
        }
    }

    #[test]
    fn test_previous_crosses_to_last_story_of_prior_author() {
        let (stories, authors) = two_authors();
        let mut playback = StoryPlayback::new(&stories, authors, 1);

        assert_eq!(playback.position(), Some(pos(1, 0)));
        assert_eq!(playback.previous(), Transition::Moved(pos(0, 1)));
        assert_eq!(playback.previous(), Transition::Moved(pos(0, 0)));
    }

    #[test]
    fn test_image_ready_only_for_current_story_while_loading() {
        let (stories, authors) = two_authors();
        let mut playback = StoryPlayback::new(&stories, authors, 0);

        assert!(!playback.image_ready("a2"));
        assert_eq!(playback.phase(), PlaybackPhase::Loading);
        assert!(playback.image_ready("a1"));
        assert_eq!(playback.phase(), PlaybackPhase::Playing);
        assert!(!playback.image_ready("a1"));

        playback.next();
        assert_eq!(playback.phase(), PlaybackPhase::Loading);
    }

    #[test]
    fn test_degenerate_sessions_close_immediately() {
        let (stories, authors) = two_authors();

        assert!(StoryPlayback::new(&stories, Vec::new(), 0).is_closed());
        assert!(StoryPlayback::new(&stories, authors.clone(), 7).is_closed());
        assert!(StoryPlayback::new(&stories, vec![author("nobody")], 0).is_closed());

        let mut playback = StoryPlayback::new(&stories, vec![author("a"), author("nobody")], 0);
        playback.next();
        assert_eq!(playback.next(), Transition::Closed);
    }

    #[test]
    fn test_close_from_any_state() {
        let (stories, authors) = two_authors();
        let mut playback = StoryPlayback::new(&stories, authors, 0);
        playback.image_ready("a1");

        assert!(playback.close());
        assert!(!playback.close());
        assert_eq!(playback.next(), Transition::Closed);
        assert_eq!(playback.previous(), Transition::Closed);
    }

    struct Harness {
        commands: mpsc::Sender<ViewerCommand>,
        events: mpsc::Receiver<ViewerEvent>,
        stories: StoryService,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start(initial_author_index: usize) -> Harness {
        let (stories, authors) = two_authors();
        let service = StoryService::new(RecordStore::in_memory());
        service.seed_if_needed(stories.clone()).await;

        let playback = StoryPlayback::new(&stories, authors, initial_author_index);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_story_viewer(
            playback,
            command_rx,
            event_tx,
            service.clone(),
            "viewer".to_string(),
            DEFAULT_STORY_DURATION,
        ));

        Harness {
            commands: command_tx,
            events: event_rx,
            stories: service,
            handle,
        }
    }

    fn shown(event: Option<ViewerEvent>) -> String {
        match event {
            Some(ViewerEvent::Position { story_id, .. }) => story_id,
            other => panic!("expected a position, got {:?}", other),
        }
    }

    async fn ready(h: &Harness, story_id: &str) {
        h.commands
            .send(ViewerCommand::ImageReady {
                story_id: story_id.to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_advance_runs_the_whole_session() {
        let mut h = start(0).await;
        assert_eq!(shown(h.events.recv().await), "a1");

        let started = tokio::time::Instant::now();
        ready(&h, "a1").await;
        assert_eq!(shown(h.events.recv().await), "a2");
        assert!(started.elapsed() >= DEFAULT_STORY_DURATION);

        ready(&h, "a2").await;
        assert_eq!(shown(h.events.recv().await), "b1");
        ready(&h, "b1").await;
        assert_eq!(h.events.recv().await, Some(ViewerEvent::Closed));

        h.handle.await.unwrap().unwrap();
        for story in h.stories.get_stories().await {
            assert_eq!(story.viewed_by, vec!["viewer".to_string()]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_auto_advance_while_loading() {
        let mut h = start(0).await;
        assert_eq!(shown(h.events.recv().await), "a1");

        // Wrong story id does not start the timer either
        ready(&h, "b1").await;
        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(60), h.events.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_navigation_cancels_pending_timer() {
        let mut h = start(0).await;
        assert_eq!(shown(h.events.recv().await), "a1");

        ready(&h, "a1").await;
        h.commands.send(ViewerCommand::Next).await.unwrap();
        assert_eq!(shown(h.events.recv().await), "a2");

        // The timer armed for a1 must not fire against a2
        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(60), h.events.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_at_start_restarts_full_duration() {
        let mut h = start(0).await;
        assert_eq!(shown(h.events.recv().await), "a1");

        ready(&h, "a1").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        h.commands.send(ViewerCommand::Previous).await.unwrap();
        let pressed = tokio::time::Instant::now();

        // The timer armed by the image was due 3s from here; it was replaced
        let early = tokio::time::timeout(
            DEFAULT_STORY_DURATION - Duration::from_millis(1),
            h.events.recv(),
        )
        .await;
        assert!(early.is_err());

        assert_eq!(shown(h.events.recv().await), "a2");
        assert!(pressed.elapsed() >= DEFAULT_STORY_DURATION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revisiting_records_view_once() {
        let mut h = start(0).await;
        assert_eq!(shown(h.events.recv().await), "a1");

        h.commands.send(ViewerCommand::Next).await.unwrap();
        assert_eq!(shown(h.events.recv().await), "a2");
        h.commands.send(ViewerCommand::Previous).await.unwrap();
        assert_eq!(shown(h.events.recv().await), "a1");

        h.commands.send(ViewerCommand::Close).await.unwrap();
        assert_eq!(h.events.recv().await, Some(ViewerEvent::Closed));
        h.handle.await.unwrap().unwrap();

        let stories = h.stories.get_stories().await;
        let a1 = stories.iter().find(|s| s.id == "a1").unwrap();
        let b1 = stories.iter().find(|s| s.id == "b1").unwrap();
        assert_eq!(a1.viewed_by, vec!["viewer".to_string()]);
        assert!(b1.viewed_by.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_commands_closes_session() {
        let Harness {
            commands,
            mut events,
            handle,
            ..
        } = start(1).await;
        assert_eq!(shown(events.recv().await), "b1");

        drop(commands);
        assert_eq!(events.recv().await, Some(ViewerEvent::Closed));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_start_closes_without_showing() {
        let mut h = start(9).await;
        assert_eq!(h.events.recv().await, Some(ViewerEvent::Closed));
        h.handle.await.unwrap().unwrap();
    }
}
