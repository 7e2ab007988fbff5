//! Turtle State Machine
//!
//! Tracks one turtle's pose and pen state and converts the imperative
//! turtle-graphics vocabulary (forward, left, pen up, goto, ...) into a
//! stream of [`CanvasCommand`]s for an external renderer to replay. Nothing
//! here draws: the machine has no notion of a display, only of the
//! instructions a display would need.
//!
//! # Emission contract
//!
//! Every mutation that changes observable state is followed by a full pose
//! snapshot, not just a delta, so a renderer can resynchronize even after
//! dropping earlier events (a superseded run's output is filtered, not
//! replayed). Draw-producing moves emit their `line-segment` first, built
//! from the position *before* the move, then the snapshot.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Pen color a fresh turtle starts with.
pub const DEFAULT_PEN_COLOR: &str = "#00ff66";

/// Pen width a fresh turtle starts with.
pub const DEFAULT_PEN_WIDTH: f64 = 2.0;

/// A point on the canvas. Origin is the canvas center; the renderer decides
/// the mapping to pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate, positive to the right.
    pub x: f64,
    /// Vertical coordinate, positive upward.
    pub y: f64,
}

/// One drawing event, constructed, serialized outward, and discarded.
///
/// Tagged by `kind` on the wire:
/// `{"kind":"line-segment","from":{"x":0.0,"y":0.0},...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum CanvasCommand {
    /// Full observable turtle state, emitted after every visible mutation.
    TurtlePose {
        /// Where the turtle stands.
        position: Point,
        /// Heading in degrees, 0 = east, counterclockwise, within [0,360).
        heading: f64,
        /// Whether the turtle itself should be drawn.
        visible: bool,
        /// Current pen color, an opaque string the renderer interprets.
        pen_color: String,
    },

    /// A stroke from `from` to `to` in the style current at draw time.
    LineSegment {
        /// Stroke start.
        from: Point,
        /// Stroke end.
        to: Point,
        /// Pen color for this stroke.
        color: String,
        /// Pen width for this stroke.
        width: f64,
        /// Animation speed hint, 0-10, for renderers that animate strokes.
        speed: u8,
    },

    /// Wipe the canvas. Pose is unaffected.
    Clear,

    /// Fill the canvas background with an opaque color string.
    Background {
        /// The color to fill with, passed through unvalidated.
        color: String,
    },
}

/// Commands produced by a single turtle call, in emission order.
///
/// A call emits at most a line segment plus a snapshot, so batches stay
/// inline.
pub type CommandBatch = SmallVec<[CanvasCommand; 2]>;

/// A turtle call crossing the engine/host boundary.
///
/// This is the explicit conversion surface between whatever value model a
/// script engine has and the state machine: engines coerce their arguments
/// into these typed shapes, and anything that does not fit is the engine's
/// error to raise.
#[derive(Clone, Debug, PartialEq)]
pub enum TurtleCall {
    /// Move along the current heading.
    Forward(f64),
    /// Move against the current heading.
    Backward(f64),
    /// Turn counterclockwise by degrees.
    Left(f64),
    /// Turn clockwise by degrees.
    Right(f64),
    /// Lift the pen.
    PenUp,
    /// Lower the pen.
    PenDown,
    /// Move to an absolute position.
    Goto {
        /// Target x.
        x: f64,
        /// Target y.
        y: f64,
    },
    /// Return to the origin and face east.
    Home,
    /// Read the pen color (`None`) or set it (`Some`).
    PenColor(Option<String>),
    /// Set the pen width.
    PenWidth(f64),
    /// Read the speed (`None`) or set it (`Some`).
    Speed(Option<f64>),
    /// Hide the turtle marker.
    Hide,
    /// Show the turtle marker.
    Show,
    /// Wipe the canvas.
    Clear,
    /// Fill the background.
    Background(String),
}

/// Value returned to the engine for a turtle call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurtleReply {
    /// The call produced no value.
    None,
    /// Result of a pen color read.
    Color(String),
    /// Result of a speed read.
    Speed(u8),
}

/// Pose and pen state for one turtle.
///
/// Created lazily, once per execution context, and mutated only by the
/// single task executing script code. It lives for the context's lifetime;
/// `clear` wipes the canvas, never the turtle.
#[derive(Clone, Debug)]
pub struct Turtle {
    position: Point,
    heading: f64,
    pen_down: bool,
    pen_color: String,
    pen_width: f64,
    speed: u8,
    visible: bool,
}

impl Default for Turtle {
    fn default() -> Self {
        Self {
            position: Point { x: 0.0, y: 0.0 },
            heading: 0.0,
            pen_down: true,
            pen_color: DEFAULT_PEN_COLOR.to_string(),
            pen_width: DEFAULT_PEN_WIDTH,
            speed: 10,
            visible: true,
        }
    }
}

impl Turtle {
    /// A turtle at the origin, facing east, pen down.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one boundary call, returning the reply and the commands it
    /// emitted in order.
    pub fn apply(&mut self, call: TurtleCall) -> (TurtleReply, CommandBatch) {
        match call {
            TurtleCall::Forward(distance) => (TurtleReply::None, self.forward(distance)),
            TurtleCall::Backward(distance) => (TurtleReply::None, self.backward(distance)),
            TurtleCall::Left(angle) => (TurtleReply::None, self.left(angle)),
            TurtleCall::Right(angle) => (TurtleReply::None, self.right(angle)),
            TurtleCall::PenUp => {
                self.pen_up();
                (TurtleReply::None, CommandBatch::new())
            }
            TurtleCall::PenDown => {
                self.pen_down();
                (TurtleReply::None, CommandBatch::new())
            }
            TurtleCall::Goto { x, y } => (TurtleReply::None, self.goto(x, y)),
            TurtleCall::Home => (TurtleReply::None, self.home()),
            TurtleCall::PenColor(None) => (
                TurtleReply::Color(self.pen_color.clone()),
                CommandBatch::new(),
            ),
            TurtleCall::PenColor(Some(color)) => (TurtleReply::None, self.set_pen_color(color)),
            TurtleCall::PenWidth(width) => {
                self.set_pen_width(width);
                (TurtleReply::None, CommandBatch::new())
            }
            TurtleCall::Speed(None) => (TurtleReply::Speed(self.speed), CommandBatch::new()),
            TurtleCall::Speed(Some(raw)) => {
                self.set_speed(raw);
                (TurtleReply::None, CommandBatch::new())
            }
            TurtleCall::Hide => (TurtleReply::None, self.hide()),
            TurtleCall::Show => (TurtleReply::None, self.show()),
            TurtleCall::Clear => (TurtleReply::None, self.clear()),
            TurtleCall::Background(color) => (TurtleReply::None, self.background(color)),
        }
    }

    /// Move `distance` along the current heading. With the pen down this
    /// emits the stroke first (from the pre-move position), then the
    /// snapshot; with the pen up, only the snapshot.
    pub fn forward(&mut self, distance: f64) -> CommandBatch {
        let from = self.position;
        let rad = self.heading.to_radians();
        let to = Point {
            x: from.x + rad.cos() * distance,
            y: from.y + rad.sin() * distance,
        };
        self.move_to(from, to)
    }

    /// Move `distance` against the current heading.
    pub fn backward(&mut self, distance: f64) -> CommandBatch {
        self.forward(-distance)
    }

    /// Turn counterclockwise by `angle` degrees.
    pub fn left(&mut self, angle: f64) -> CommandBatch {
        self.heading = normalize_heading(self.heading + angle);
        self.snapshot_batch()
    }

    /// Turn clockwise by `angle` degrees.
    pub fn right(&mut self, angle: f64) -> CommandBatch {
        self.left(-angle)
    }

    /// Lift the pen. No emission; the flag is consulted on the next draw.
    pub fn pen_up(&mut self) {
        self.pen_down = false;
    }

    /// Lower the pen. No emission.
    pub fn pen_down(&mut self) {
        self.pen_down = true;
    }

    /// Move straight to an absolute position, drawing if the pen is down.
    pub fn goto(&mut self, x: f64, y: f64) -> CommandBatch {
        let from = self.position;
        self.move_to(from, Point { x, y })
    }

    /// Move to the origin and face east. Draws the way `goto` does, but
    /// emits a single snapshot covering both the move and the heading
    /// reset.
    pub fn home(&mut self) -> CommandBatch {
        let from = self.position;
        let to = Point { x: 0.0, y: 0.0 };
        let mut batch = CommandBatch::new();
        if self.pen_down {
            batch.push(self.stroke(from, to));
        }
        self.position = to;
        self.heading = 0.0;
        batch.push(self.pose_snapshot());
        batch
    }

    /// Current pen color.
    #[must_use]
    pub fn pen_color(&self) -> &str {
        &self.pen_color
    }

    /// Set the pen color. Color is part of the observable pose, so this
    /// emits a snapshot.
    pub fn set_pen_color(&mut self, color: impl Into<String>) -> CommandBatch {
        self.pen_color = color.into();
        self.snapshot_batch()
    }

    /// Current pen width.
    #[must_use]
    pub fn pen_width(&self) -> f64 {
        self.pen_width
    }

    /// Set the pen width. No emission until the next draw.
    pub fn set_pen_width(&mut self, width: f64) {
        self.pen_width = width;
    }

    /// Current speed, 0-10.
    #[must_use]
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Set the speed from a raw numeric value: truncated to an integer and
    /// clamped into [0,10]. Non-finite input stores the maximum, 10.
    pub fn set_speed(&mut self, raw: f64) {
        self.speed = if raw.is_finite() {
            (raw as i64).clamp(0, 10) as u8
        } else {
            10
        };
    }

    /// Hide the turtle marker and emit a snapshot.
    pub fn hide(&mut self) -> CommandBatch {
        self.visible = false;
        self.snapshot_batch()
    }

    /// Show the turtle marker and emit a snapshot.
    pub fn show(&mut self) -> CommandBatch {
        self.visible = true;
        self.snapshot_batch()
    }

    /// Emit a canvas wipe. Pose and pen state are untouched.
    pub fn clear(&self) -> CommandBatch {
        let mut batch = CommandBatch::new();
        batch.push(CanvasCommand::Clear);
        batch
    }

    /// Emit a background fill with an opaque color string.
    pub fn background(&self, color: impl Into<String>) -> CommandBatch {
        let mut batch = CommandBatch::new();
        batch.push(CanvasCommand::Background {
            color: color.into(),
        });
        batch
    }

    /// Where the turtle stands.
    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    /// Heading in degrees, always within [0,360).
    #[must_use]
    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// Whether the pen is down.
    #[must_use]
    pub fn is_pen_down(&self) -> bool {
        self.pen_down
    }

    /// Whether the turtle marker is visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Full observable state as a single command, for renderers to
    /// resynchronize from.
    #[must_use]
    pub fn pose_snapshot(&self) -> CanvasCommand {
        CanvasCommand::TurtlePose {
            position: self.position,
            heading: self.heading,
            visible: self.visible,
            pen_color: self.pen_color.clone(),
        }
    }

    fn move_to(&mut self, from: Point, to: Point) -> CommandBatch {
        let mut batch = CommandBatch::new();
        if self.pen_down {
            batch.push(self.stroke(from, to));
        }
        self.position = to;
        batch.push(self.pose_snapshot());
        batch
    }

    fn stroke(&self, from: Point, to: Point) -> CanvasCommand {
        CanvasCommand::LineSegment {
            from,
            to,
            color: self.pen_color.clone(),
            width: self.pen_width,
            speed: self.speed,
        }
    }

    fn snapshot_batch(&self) -> CommandBatch {
        let mut batch = CommandBatch::new();
        batch.push(self.pose_snapshot());
        batch
    }
}

fn normalize_heading(degrees: f64) -> f64 {
    // rem_euclid returns exactly 360.0 for tiny negative inputs, which
    // would escape the [0,360) range.
    let heading = degrees.rem_euclid(360.0);
    if heading >= 360.0 {
        0.0
    } else {
        heading
    }
}
