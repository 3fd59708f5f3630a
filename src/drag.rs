//! Drag gestures: `drag_start` lifts the card, `hover` previews the new slot
//! within the card's own list, `drop` commits. A hover over another list
//! (a different parent, or the canvas for a subtask) is only remembered and
//! becomes an attach or detach on drop.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::board::{Board, BoardError, Outcome};
use crate::model::{OrderContext, Position, TaskId};
use crate::util::timing::Throttle;

#[derive(Debug, Clone, PartialEq)]
struct Gesture {
    item: TaskId,
    origin: OrderContext,
    /// Order of `origin` when the gesture began
    prior: Vec<TaskId>,
    /// Latest hover target, applied or not
    target: Option<(OrderContext, Position)>,
}

#[derive(Debug)]
pub struct DragController {
    throttle: Throttle,
    gesture: Option<Gesture>,
}

impl DragController {
    pub fn new(frame_interval: Duration) -> Self {
        DragController {
            throttle: Throttle::new(frame_interval),
            gesture: None,
        }
    }

    pub fn for_board(board: &Board) -> Self {
        DragController::new(Duration::from_millis(board.config().drag.frame_interval_ms))
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture.is_some()
    }

    /// Begin dragging `item`. The card is brought to the front first.
    pub fn drag_start(&mut self, board: &mut Board, item: &TaskId) -> Result<Outcome, BoardError> {
        let Some(origin) = board.store().context_of(item) else {
            debug!(task = %item, "drag of missing task ignored");
            return Ok(Outcome::Ignored);
        };
        let prior = board.order_of(&origin).unwrap_or_default();
        let lifted = board.bring_to_front(item)?;
        self.throttle.reset();
        self.gesture = Some(Gesture {
            item: item.clone(),
            origin,
            prior,
            target: None,
        });
        Ok(lifted)
    }

    /// Record a hover target. Targets in the dragged card's own list are
    /// previewed at most once per frame. Returns whether the order changed.
    pub fn hover(
        &mut self,
        board: &mut Board,
        item: &TaskId,
        context: OrderContext,
        position: Position,
        now: Instant,
    ) -> Result<bool, BoardError> {
        let Some(gesture) = self.gesture.as_mut().filter(|g| &g.item == item) else {
            return Ok(false);
        };
        gesture.target = Some((context.clone(), position.clone()));
        if context != gesture.origin || !self.throttle.ready(now) {
            return Ok(false);
        }
        board.move_temporary(item, &context, &position)
    }

    /// Finish the gesture: apply the latest hover, then persist it
    pub fn drop(&mut self, board: &mut Board, item: &TaskId) -> Result<Outcome, BoardError> {
        let Some(gesture) = self.gesture.take().filter(|g| &g.item == item) else {
            return Ok(Outcome::Ignored);
        };
        let Some((context, position)) = gesture.target else {
            return Ok(Outcome::Local);
        };

        if context == gesture.origin {
            board.move_temporary(item, &context, &position)?;
            return board.commit_order(&context, gesture.prior);
        }

        match context {
            OrderContext::Parent(parent) => board.attach_child(item, &parent, position),
            OrderContext::Space(_) => {
                let Some((x, y)) = board.task(item).map(|t| (t.x, t.y)) else {
                    return Ok(Outcome::Ignored);
                };
                board.detach_to_root(item, x, y, position)
            }
        }
    }

    /// Abandon the gesture and put the previewed order back
    pub fn cancel(&mut self, board: &mut Board) {
        let Some(gesture) = self.gesture.take() else {
            return;
        };
        for (i, id) in gesture.prior.iter().enumerate() {
            let position = match i {
                0 => Position::Start,
                _ => Position::After(gesture.prior[i - 1].clone()),
            };
            if let Err(e) = board.move_temporary(id, &gesture.origin, &position) {
                debug!(error = %e, "order restore skipped");
            }
        }
    }
}
