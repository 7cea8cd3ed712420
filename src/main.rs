use anyhow::{anyhow, Result};
use tokio::{signal, sync::mpsc};
use tracing::{debug, info, warn};

use social_feed_engine::feed::FeedService;
use social_feed_engine::notifications::NotificationService;
use social_feed_engine::stories::{author_order, StoryService};
use social_feed_engine::story_viewer::{self, StoryPlayback, ViewerCommand, ViewerEvent};
use social_feed_engine::store::RecordStore;
use social_feed_engine::users::{Session, UserDirectory};
use social_feed_engine::{config, logging, metrics, seed};

fn main() -> Result<()> {
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        logging::setup_logging();

        // Load environment variables from .env file if present
        dotenv::dotenv().ok();

        info!(worker_threads, "Starting social feed engine");

        let config = config::Config::from_env()?;
        let store = RecordStore::connect(&config.storage_url).await?;

        let notifications = NotificationService::new(store.clone());
        let directory = UserDirectory::new(store.clone(), notifications.clone());
        let feed = FeedService::new(store.clone(), notifications.clone());
        let stories = StoryService::new(store.clone());

        directory.seed_if_needed(seed::users()).await;
        feed.seed_if_needed(seed::posts()).await;
        stories.seed_if_needed(seed::stories()).await;

        let mut session = Session::new();
        let user = session
            .login(&directory, &config.login_username)
            .await
            .cloned()
            .ok_or_else(|| anyhow!("unknown user {}", config.login_username))?;

        notifications
            .seed_if_needed(&user.id, &directory.get_users().await, &feed.get_posts().await)
            .await;

        let feed_posts = feed.home_feed(&user.following_ids()).await;
        info!(posts = feed_posts.len(), "Loaded home feed");

        // Notifications page: show the groups, then everything counts as seen
        let groups = notifications.get_grouped_notifications(&user.id).await;
        if groups.is_empty() {
            info!("No notifications yet");
        }
        for group in &groups {
            let names: Vec<&str> = group.users.iter().map(|u| u.username.as_str()).collect();
            info!(
                notification_type = ?group.kind,
                post_id = ?group.post_id,
                users = ?names,
                count = group.ids.len(),
                latest_at = %group.latest_at,
                is_read = group.is_read,
                "Notification group"
            );
        }
        notifications.mark_all_as_read(&user.id).await;

        let home_stories = stories.home_stories(&user.following_ids(), &user.id).await;
        let authors = author_order(&home_stories);
        info!(
            stories = home_stories.len(),
            authors = authors.len(),
            "Opening story viewer"
        );

        let playback = StoryPlayback::new(&home_stories, authors, 0);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let viewer_handle = tokio::spawn(story_viewer::run_story_viewer(
            playback,
            command_rx,
            event_tx,
            stories.clone(),
            user.id.clone(),
            config.story_duration,
        ));

        // Headless client: every image is ready the moment it is shown
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(ViewerEvent::Position { position, author_id, story_id }) => {
                        info!(
                            author_index = position.author_index,
                            story_index = position.story_index,
                            author_id = %author_id,
                            story_id = %story_id,
                            "Story shown"
                        );
                        if command_tx.send(ViewerCommand::ImageReady { story_id }).await.is_err() {
                            break;
                        }
                    }
                    Some(ViewerEvent::Closed) | None => break,
                },
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, closing story viewer");
                    let _ = command_tx.send(ViewerCommand::Close).await;
                    break;
                }
            }
        }

        drop(command_tx);
        match viewer_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Story viewer failed: {}", e),
            Err(e) => warn!("Story viewer task panicked: {}", e),
        }

        session.refresh(&directory).await;
        session.logout();

        debug!("Metrics at shutdown:\n{}", metrics::metrics_handler());
        info!("Shutdown complete");
        Ok(())
    })
}
