use std::{fs, path::PathBuf};

use anyhow::Context;
use rand::{seq::SliceRandom, Rng};
use threadweave_api::{PostId, UserId, VoteType};
use threadweave_mock_server::MockServer;

const NUM_USERS: usize = 8;

const NUM_SEED_COMMENTS: usize = 200;
const NUM_LIVE_COMMENTS: usize = 100;
const NUM_LIVE_DELETES: usize = 15;
const NUM_VOTES: usize = 400;

const SEED_PAGE_SIZE: usize = 50;
const ROOT_PROBABILITY: f64 = 0.2;

/// Probability for two consecutive events to be delivered out of order
const SWAP_PROBABILITY: f64 = 0.1;

const COMMENT_WORD_COUNT: usize = 25;

fn gen_user(rng: &mut impl Rng) -> UserId {
    UserId::new(format!("user{}", rng.gen_range(0..NUM_USERS)))
}

fn gen_comment_text() -> String {
    lipsum::lipsum_words(COMMENT_WORD_COUNT)
}

fn gen_comment(mock: &mut MockServer, rng: &mut impl Rng) -> anyhow::Result<()> {
    let num = mock.test_num_comments();
    let parent = match num == 0 || rng.gen_bool(ROOT_PROBABILITY) {
        true => None,
        false => mock.test_get_comment_id(rng.gen_range(0..num)).cloned(),
    };
    mock.add_comment(
        MockServer::new_comment_id(),
        gen_user(rng),
        parent,
        gen_comment_text(),
    )
    .context("adding comment")?;
    Ok(())
}

fn gen_vote(mock: &mut MockServer, rng: &mut impl Rng) -> anyhow::Result<()> {
    let num = mock.test_num_comments();
    if num == 0 {
        return Ok(());
    }
    let Some(target) = mock.test_get_comment_id(rng.gen_range(0..num)).cloned() else {
        return Ok(());
    };
    let vote = [Some(VoteType::Upvote), Some(VoteType::Downvote), None]
        .choose(rng)
        .copied()
        .flatten();
    mock.vote(gen_user(rng), &target, vote).context("voting")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let out = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| String::from(".")));
    let mut rng = rand::thread_rng();
    let mut mock = MockServer::new(PostId::from("post")).with_viewer(UserId::from("user0"));

    // Thread as it is when the page gets loaded
    for _ in 0..NUM_SEED_COMMENTS {
        gen_comment(&mut mock, &mut rng)?;
    }
    for _ in 0..NUM_VOTES / 2 {
        gen_vote(&mut mock, &mut rng)?;
    }
    let seed = mock
        .page_of_roots(&PostId::from("post"), SEED_PAGE_SIZE, None)
        .context("fetching seed page")?;

    // Activity while the page is open
    let mut feed = mock.subscribe();
    for _ in 0..NUM_LIVE_COMMENTS {
        gen_comment(&mut mock, &mut rng)?;
        if rng.gen_bool(0.5) {
            gen_vote(&mut mock, &mut rng)?;
        }
    }
    for _ in 0..NUM_LIVE_DELETES {
        let num = mock.test_num_comments();
        if num == 0 {
            break;
        }
        if let Some(id) = mock.test_get_comment_id(rng.gen_range(0..num)).cloned() {
            mock.delete_comment(&id).context("deleting comment")?;
        }
    }
    for _ in 0..NUM_VOTES / 2 {
        gen_vote(&mut mock, &mut rng)?;
    }

    let mut events = Vec::new();
    while let Ok(evt) = feed.try_recv() {
        events.push(evt.to_payload().context("encoding push event")?);
    }
    for i in 1..events.len() {
        if rng.gen_bool(SWAP_PROBABILITY) {
            events.swap(i - 1, i);
        }
    }
    // heartbeats are interleaved with the events in the real stream
    events.insert(0, String::from(": keep-alive"));

    fs::create_dir_all(&out).with_context(|| format!("creating directory {out:?}"))?;
    let seed_path = out.join("seed.json");
    fs::write(&seed_path, serde_json::to_string_pretty(&seed)?)
        .with_context(|| format!("writing {seed_path:?}"))?;
    let events_path = out.join("events.jsonl");
    fs::write(&events_path, events.join("\n") + "\n")
        .with_context(|| format!("writing {events_path:?}"))?;
    println!(
        "wrote {} root comments to {seed_path:?} and {} events to {events_path:?}",
        seed.edges.len(),
        events.len()
    );
    Ok(())
}
