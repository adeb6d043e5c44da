/*
 * Responsibility
 * - 階層付き state machine の共通エンジン (authenticate / authorize で共有)
 * - 遷移表 (state, event, guard) → target, 子に該当がなければ親の表を見る
 * - entry action が返した event は FIFO に積み、fire() の中で捌き切る (再入しない)
 *
 * Notes
 * - 1 instance = 1 判定。使い回さない
 */
use std::collections::VecDeque;
use std::fmt;

pub type Guard<C> = fn(&C) -> bool;

pub struct Transition<S, E, C> {
    pub from: S,
    pub event: E,
    pub to: S,
    pub guard: Guard<C>,
}

pub fn always<C>(_: &C) -> bool {
    true
}

/// Last error recorded by an entry action; also drives the `has_error` guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionError {
    pub message: String,
}

impl DecisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DecisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Static description of a hierarchical state chart.
pub trait StateChart {
    type State: Copy + Eq + fmt::Debug + 'static;
    type Event: Copy + Eq + fmt::Debug + 'static;
    type Context: 'static;

    const INITIAL: Self::State;

    fn parent(state: Self::State) -> Option<Self::State>;

    fn transitions() -> &'static [Transition<Self::State, Self::Event, Self::Context>];

    /// Entry action. A returned event is queued, not fired inline.
    fn on_entry(state: Self::State, ctx: &mut Self::Context) -> Option<Self::Event>;
}

pub struct RunToCompletion<M: StateChart> {
    state: M::State,
    queue: VecDeque<M::Event>,
    entered: Vec<M::State>,
    ctx: M::Context,
}

impl<M: StateChart> RunToCompletion<M> {
    pub fn new(ctx: M::Context) -> Self {
        Self {
            state: M::INITIAL,
            queue: VecDeque::new(),
            entered: Vec::new(),
            ctx,
        }
    }

    pub fn state(&self) -> M::State {
        self.state
    }

    /// States entered so far, in order.
    pub fn entered(&self) -> &[M::State] {
        &self.entered
    }

    pub fn into_parts(self) -> (M::State, M::Context) {
        (self.state, self.ctx)
    }

    /// Fires `event` and drains every event queued by entry actions before returning.
    pub fn fire(&mut self, event: M::Event) {
        self.queue.push_back(event);
        while let Some(event) = self.queue.pop_front() {
            self.step(event);
        }
    }

    fn step(&mut self, event: M::Event) {
        let Some(target) = self.find(self.state, event) else {
            tracing::debug!(state = ?self.state, ?event, "unhandled event");
            return;
        };

        let source = self.state;
        tracing::trace!(from = ?source, ?event, to = ?target, "transition");
        self.state = target;

        for state in Self::entering(source, target) {
            self.entered.push(state);
            if let Some(next) = M::on_entry(state, &mut self.ctx) {
                self.queue.push_back(next);
            }
        }
    }

    fn find(&self, state: M::State, event: M::Event) -> Option<M::State> {
        let mut current = Some(state);
        while let Some(state) = current {
            let matched = M::transitions()
                .iter()
                .find(|t| t.from == state && t.event == event && (t.guard)(&self.ctx));
            if let Some(transition) = matched {
                return Some(transition.to);
            }
            current = M::parent(state);
        }
        None
    }

    /// Target plus the ancestors of target that were not already active, outermost first.
    fn entering(source: M::State, target: M::State) -> Vec<M::State> {
        if source == target {
            return vec![target];
        }
        let active = Self::ancestry(source);
        let mut entering: Vec<_> = Self::ancestry(target)
            .into_iter()
            .take_while(|state| !active.contains(state))
            .collect();
        entering.reverse();
        entering
    }

    fn ancestry(state: M::State) -> Vec<M::State> {
        let mut chain = vec![state];
        let mut current = M::parent(state);
        while let Some(parent) = current {
            chain.push(parent);
            current = M::parent(parent);
        }
        chain
    }
}

impl<M: StateChart> fmt::Debug for RunToCompletion<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunToCompletion")
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .finish()
    }
}
