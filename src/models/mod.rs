pub mod answer;
pub mod conversation;
pub mod loaders;
pub mod message;
pub mod prediction;
pub mod session;
pub mod step;

pub use answer::{first_unanswered, AnswerSet, AnswerValue, Answers};
pub use conversation::{ConversationState, Status};
pub use loaders::{load_csv, parse_csv, CsvRow, CsvTable};
pub use message::{Message, MessageKind, Role};
pub use prediction::{Explanation, Label, Prediction};
pub use session::{derive_title, Session, SessionDraft, SessionPatch, UiPreferences};
pub use step::{validate_answer, FieldKind, StepKey, STEPS, STEP_COUNT};
