//! Message bodies for delivered and announced records.
//!
//! Bodies are plain text; callers wrap them with
//! [`code_block`](crate::delivery::code_block) before sending.

use crate::records::{Poll, Reminder};

/// Body sent for a poll nobody voted on.
pub const NO_VOTES_MESSAGE: &str = "No one voted on this poll :(";

/// Per-choice percentages in choice order, or `None` when nobody voted.
///
/// Each percentage is rounded independently, ties to even, so the set need
/// not sum to 100.
pub fn choice_percentages(poll: &Poll) -> Option<Vec<u32>> {
    let total = poll.total_votes();
    if total == 0 {
        return None;
    }
    let percentages = (0..poll.choices.len())
        .map(|idx| {
            let share = poll.vote_count(idx) as f64 / total as f64 * 100.0;
            share.round_ties_even() as u32
        })
        .collect();
    Some(percentages)
}

/// Results message for an expired poll.
pub fn render_poll_results(poll: &Poll) -> String {
    let Some(percentages) = choice_percentages(poll) else {
        return NO_VOTES_MESSAGE.to_owned();
    };

    let mut msg = format!(
        "Results for prompt \"{}\" (Total votes: {}):\n\n",
        poll.prompt,
        poll.total_votes()
    );
    for (choice, percentage) in poll.choices.iter().zip(percentages) {
        msg.push_str(&format!("\t{choice} -> {percentage}%\n"));
    }
    msg
}

/// Reminder text is delivered verbatim.
pub fn render_reminder(reminder: &Reminder) -> String {
    reminder.message.clone()
}

/// Announcement posted when a poll is created: prompt, numbered choices and
/// the vote instruction.
pub fn render_poll_announcement(poll: &Poll) -> String {
    let mut msg = format!("{}\n\n", poll.prompt);
    for (idx, choice) in poll.choices.iter().enumerate() {
        msg.push_str(&format!("{}. {choice}\n", idx + 1));
    }
    msg.push_str(&format!(
        "Type or DM me \"!vote {} <choice number>\" to vote",
        poll.id
    ));
    msg
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn poll_with_votes(counts: &[usize]) -> Poll {
        let choices = (0..counts.len()).map(|i| format!("choice{}", i + 1)).collect();
        let mut poll = Poll::new("p1", "a", "c", "prompt", choices, 0);
        for (idx, count) in counts.iter().enumerate() {
            if *count > 0 {
                let voters = (0..*count).map(|n| format!("voter-{idx}-{n}")).collect();
                poll.votes.insert(idx.to_string(), voters);
            }
        }
        poll
    }

    #[test]
    fn two_to_one_renders_67_and_33() {
        let poll = poll_with_votes(&[2, 1]);
        assert_eq!(choice_percentages(&poll), Some(vec![67, 33]));

        let msg = render_poll_results(&poll);
        assert!(msg.contains("prompt"));
        assert!(msg.contains("Total votes: 3"));
        assert!(msg.contains("choice1 -> 67%"));
        assert!(msg.contains("choice2 -> 33%"));
    }

    #[test]
    fn zero_votes_renders_no_one_voted() {
        let mut poll = poll_with_votes(&[0, 0]);
        poll.votes.insert("0".to_owned(), Vec::new());
        assert_eq!(choice_percentages(&poll), None);
        let msg = render_poll_results(&poll);
        assert_eq!(msg, NO_VOTES_MESSAGE);
        assert!(!msg.contains('%'));
    }

    #[test]
    fn percentages_are_rounded_independently() {
        let poll = poll_with_votes(&[1, 1, 1]);
        assert_eq!(choice_percentages(&poll), Some(vec![33, 33, 33]));
    }

    #[test]
    fn half_percent_ties_round_to_even() {
        let poll = poll_with_votes(&[1, 7]);
        assert_eq!(choice_percentages(&poll), Some(vec![12, 88]));
        assert!(render_poll_results(&poll).contains("choice1 -> 12%"));
    }

    #[test]
    fn votes_for_unknown_choices_are_not_counted() {
        let mut poll = poll_with_votes(&[1, 0]);
        poll.votes.insert("7".to_owned(), vec!["ghost".to_owned()]);
        assert_eq!(choice_percentages(&poll), Some(vec![100, 0]));
    }

    #[test]
    fn reminder_is_verbatim() {
        let reminder = Reminder::new("r1", "a", "c", "take out the *bins*", 0);
        assert_eq!(render_reminder(&reminder), "take out the *bins*");
    }

    #[test]
    fn announcement_numbers_choices_from_one() {
        let poll = poll_with_votes(&[0, 0]);
        let msg = render_poll_announcement(&poll);
        assert!(msg.starts_with("prompt\n\n1. choice1\n2. choice2\n"));
        assert!(msg.contains("!vote p1 <choice number>"));
    }
}
