/// Reconciliation planning
///
/// [`plan`] looks at one session as it is right now and decides what the
/// dialer should do about it. It performs no I/O, so every rule of the
/// parallel dialer can be tested here without a database or a provider.
///
/// # Rules
///
/// 1. A paused or canceled session hangs up every line that is not bridged
///    to the agent. A canceled session with no live lines is finished.
/// 2. While the bridged line is live, every other line is hung up and no
///    calls are placed.
/// 3. The human answer with the earliest `answered_at` is bridged; every
///    other line is hung up.
/// 4. A line answered by a machine gets the voicemail drop if one is
///    configured, otherwise it is hung up.
/// 5. Free lines (`lines` minus live lines) are filled from the remaining
///    leads in order.
/// 6. With no remaining leads and no live lines the session is complete.
///
/// Lines the dialer already hung up or dropped a voicemail on stay live
/// until the provider reports them ended; they still occupy a line but are
/// not acted on again.

use chrono::{DateTime, Utc};
use dialdesk_shared::models::{
    call::{AnsweredBy, Call, CallStatus},
    dial_session::DialSessionState,
};
use uuid::Uuid;

/// A call of the session that has not ended
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub call_id: Uuid,
    pub status: CallStatus,
    pub answered_by: AnsweredBy,
    pub answered_at: Option<DateTime<Utc>>,

    /// A hang-up or voicemail drop was already sent for this call
    pub released: bool,
}

impl Line {
    pub fn from_call(call: &Call, released: bool) -> Self {
        Line {
            call_id: call.id,
            status: call.status,
            answered_by: call.answered_by,
            answered_at: call.answered_at,
            released,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    pub state: DialSessionState,

    /// Line count of the session
    pub lines: usize,

    /// Calls that have not ended, oldest first
    pub live: Vec<Line>,

    pub connected_call_id: Option<Uuid>,
    pub remaining_leads: &'a [Uuid],

    /// Placed calls request answering machine detection
    pub amd_enabled: bool,

    pub voicemail_drop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Place { lead_id: Uuid },
    Bridge { call_id: Uuid },
    Hangup { call_id: Uuid },
    DropVoicemail { call_id: Uuid },

    /// Running session is done
    Complete,

    /// Canceled session has no lines left
    Finish,
}

impl Snapshot<'_> {
    fn bridged(&self) -> Option<&Line> {
        let connected = self.connected_call_id?;
        self.live.iter().find(|line| line.call_id == connected)
    }

    /// A person picked up
    ///
    /// Without detection every answered call counts as a person. With
    /// detection an answered call waits for the result.
    fn is_human(&self, line: &Line) -> bool {
        match line.answered_by {
            AnsweredBy::Human => true,
            AnsweredBy::Machine => false,
            AnsweredBy::Unknown => !self.amd_enabled && line.status == CallStatus::InProgress,
        }
    }

    fn hang_up_all_except(&self, keep: Option<Uuid>, actions: &mut Vec<Action>) {
        for line in &self.live {
            if !line.released && Some(line.call_id) != keep {
                actions.push(Action::Hangup {
                    call_id: line.call_id,
                });
            }
        }
    }
}

pub fn plan(snapshot: &Snapshot<'_>) -> Vec<Action> {
    let mut actions = Vec::new();
    let bridged = snapshot.bridged().map(|line| line.call_id);

    match snapshot.state {
        DialSessionState::Pending | DialSessionState::Completed => return actions,
        DialSessionState::Paused => {
            snapshot.hang_up_all_except(bridged, &mut actions);
            return actions;
        }
        DialSessionState::Canceled => {
            snapshot.hang_up_all_except(bridged, &mut actions);
            if snapshot.live.is_empty() {
                actions.push(Action::Finish);
            }
            return actions;
        }
        DialSessionState::Running => {}
    }

    if bridged.is_some() {
        snapshot.hang_up_all_except(bridged, &mut actions);
        return actions;
    }

    let first_human = snapshot
        .live
        .iter()
        .filter(|line| !line.released && snapshot.is_human(line))
        .min_by_key(|line| (line.answered_at.is_none(), line.answered_at));

    if let Some(winner) = first_human {
        actions.push(Action::Bridge {
            call_id: winner.call_id,
        });
        snapshot.hang_up_all_except(Some(winner.call_id), &mut actions);
        return actions;
    }

    for line in &snapshot.live {
        if line.released || line.answered_by != AnsweredBy::Machine {
            continue;
        }
        actions.push(if snapshot.voicemail_drop {
            Action::DropVoicemail {
                call_id: line.call_id,
            }
        } else {
            Action::Hangup {
                call_id: line.call_id,
            }
        });
    }

    let free = snapshot.lines.saturating_sub(snapshot.live.len());
    for lead_id in snapshot.remaining_leads.iter().take(free) {
        actions.push(Action::Place { lead_id: *lead_id });
    }

    if snapshot.remaining_leads.is_empty() && snapshot.live.is_empty() {
        actions.push(Action::Complete);
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ringing() -> Line {
        Line {
            call_id: Uuid::new_v4(),
            status: CallStatus::Ringing,
            answered_by: AnsweredBy::Unknown,
            answered_at: None,
            released: false,
        }
    }

    fn answered(by: AnsweredBy, seconds_ago: i64) -> Line {
        Line {
            status: CallStatus::InProgress,
            answered_by: by,
            answered_at: Some(Utc::now() - Duration::seconds(seconds_ago)),
            ..ringing()
        }
    }

    fn snapshot(live: Vec<Line>, leads: &[Uuid]) -> Snapshot<'_> {
        Snapshot {
            state: DialSessionState::Running,
            lines: 3,
            live,
            connected_call_id: None,
            remaining_leads: leads,
            amd_enabled: true,
            voicemail_drop: false,
        }
    }

    fn leads(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn placed(actions: &[Action]) -> Vec<Uuid> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Place { lead_id } => Some(*lead_id),
                _ => None,
            })
            .collect()
    }

    fn hung_up(actions: &[Action]) -> Vec<Uuid> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Hangup { call_id } => Some(*call_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fills_free_lines_in_lead_order() {
        let leads = leads(5);
        let actions = plan(&snapshot(vec![ringing()], &leads));

        assert_eq!(placed(&actions), leads[..2].to_vec());
        assert!(!actions.contains(&Action::Complete));
    }

    #[test]
    fn test_placement_bounded_by_remaining_leads() {
        let leads = leads(1);
        let actions = plan(&snapshot(vec![], &leads));
        assert_eq!(actions, vec![Action::Place { lead_id: leads[0] }]);
    }

    #[test]
    fn test_released_lines_still_occupy_capacity() {
        let leads = leads(5);
        let mut line = answered(AnsweredBy::Machine, 2);
        line.released = true;

        let actions = plan(&snapshot(vec![line, ringing(), ringing()], &leads));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_never_exceeds_lines() {
        let leads = leads(10);
        for live in 0..=4 {
            let lines: Vec<Line> = (0..live).map(|_| ringing()).collect();
            let actions = plan(&snapshot(lines, &leads));
            assert!(live + placed(&actions).len() <= 3.max(live));
        }
    }

    #[test]
    fn test_first_answer_wins() {
        let late = answered(AnsweredBy::Human, 1);
        let early = answered(AnsweredBy::Human, 5);
        let other = ringing();
        let leads = leads(3);

        let actions = plan(&snapshot(vec![late.clone(), early.clone(), other.clone()], &leads));

        assert_eq!(actions[0], Action::Bridge { call_id: early.call_id });
        let mut hangups = hung_up(&actions);
        hangups.sort();
        let mut expected = vec![late.call_id, other.call_id];
        expected.sort();
        assert_eq!(hangups, expected);
        assert!(placed(&actions).is_empty());
    }

    #[test]
    fn test_bridged_line_blocks_placement() {
        let bridged = answered(AnsweredBy::Human, 30);
        let straggler = answered(AnsweredBy::Human, 3);
        let leads = leads(4);

        let mut snap = snapshot(vec![bridged.clone(), straggler.clone()], &leads);
        snap.connected_call_id = Some(bridged.call_id);

        assert_eq!(plan(&snap), vec![Action::Hangup { call_id: straggler.call_id }]);
    }

    #[test]
    fn test_dialing_resumes_after_bridged_call_ends() {
        let leads = leads(4);
        let mut snap = snapshot(vec![], &leads);
        snap.connected_call_id = Some(Uuid::new_v4());

        assert_eq!(placed(&plan(&snap)).len(), 3);
    }

    #[test]
    fn test_waits_for_detection_result() {
        let mut line = answered(AnsweredBy::Unknown, 1);
        line.answered_at = None;
        let leads = leads(0);

        let actions = plan(&snapshot(vec![line], &leads));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_answer_without_detection_is_bridged() {
        let line = answered(AnsweredBy::Unknown, 1);
        let leads = leads(0);
        let mut snap = snapshot(vec![line.clone()], &leads);
        snap.amd_enabled = false;

        assert_eq!(plan(&snap), vec![Action::Bridge { call_id: line.call_id }]);
    }

    #[test]
    fn test_machine_gets_voicemail_drop() {
        let machine = answered(AnsweredBy::Machine, 1);
        let leads = leads(0);
        let mut snap = snapshot(vec![machine.clone()], &leads);

        assert_eq!(plan(&snap), vec![Action::Hangup { call_id: machine.call_id }]);

        snap.voicemail_drop = true;
        assert_eq!(
            plan(&snap),
            vec![Action::DropVoicemail { call_id: machine.call_id }]
        );
    }

    #[test]
    fn test_human_beats_machine() {
        let machine = answered(AnsweredBy::Machine, 10);
        let human = answered(AnsweredBy::Human, 1);
        let leads = leads(0);
        let mut snap = snapshot(vec![machine.clone(), human.clone()], &leads);
        snap.voicemail_drop = true;

        assert_eq!(
            plan(&snap),
            vec![
                Action::Bridge { call_id: human.call_id },
                Action::Hangup { call_id: machine.call_id },
            ]
        );
    }

    #[test]
    fn test_complete_only_when_exhausted_and_idle() {
        let none = leads(0);
        assert_eq!(plan(&snapshot(vec![], &none)), vec![Action::Complete]);
        assert!(plan(&snapshot(vec![ringing()], &none)).is_empty());

        let one = leads(1);
        assert!(!plan(&snapshot(vec![], &one)).contains(&Action::Complete));
    }

    #[test]
    fn test_paused_hangs_up_everything_but_the_bridge() {
        let bridged = answered(AnsweredBy::Human, 20);
        let ring = ringing();
        let leads = leads(5);

        let mut snap = snapshot(vec![bridged.clone(), ring.clone()], &leads);
        snap.state = DialSessionState::Paused;
        snap.connected_call_id = Some(bridged.call_id);

        assert_eq!(plan(&snap), vec![Action::Hangup { call_id: ring.call_id }]);
    }

    #[test]
    fn test_canceled_finishes_once_idle() {
        let ring = ringing();
        let leads = leads(5);

        let mut snap = snapshot(vec![ring.clone()], &leads);
        snap.state = DialSessionState::Canceled;
        assert_eq!(plan(&snap), vec![Action::Hangup { call_id: ring.call_id }]);

        snap.live.clear();
        assert_eq!(plan(&snap), vec![Action::Finish]);
    }

    #[test]
    fn test_terminal_and_pending_sessions_do_nothing() {
        let leads = leads(2);
        let mut snap = snapshot(vec![], &leads);

        snap.state = DialSessionState::Pending;
        assert!(plan(&snap).is_empty());

        snap.state = DialSessionState::Completed;
        assert!(plan(&snap).is_empty());
    }
}
