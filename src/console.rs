//! Line-oriented shell: parses commands from stdin and prints what changed
//! in the session after each event.

use crate::curriculum::{self, Level};
use crate::state_machine::{Event, Phase, Session, Step, View};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Lang,
    Level(Level),
    Back,
    List,
    Lesson(String),
    Story,
    Song,
    Quiz,
    Speak,
    Pause,
    Record,
    Stop,
    Cancel,
    Draw,
    Abort,
    Exit,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
commands:
  lang                 switch Arabic/English
  level kg1|kg2        choose a level
  list                 show the lessons of the level
  lesson <id>          open a lesson (explanation)
  story | song | quiz  lesson activities
  speak                read the current text aloud
  pause                pause/resume speech
  record | stop        talk to the teacher (stop sends)
  cancel               throw the recording away
  draw                 get a coloring page
  abort                give up waiting for the teacher
  exit                 leave the lesson
  back                 back to the welcome screen
  quit                 close the program";

/// `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match head.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "lang" => Command::Lang,
        "level" => {
            let level = arg
                .and_then(Level::parse)
                .ok_or(ParseError::Usage("level kg1|kg2"))?;
            Command::Level(level)
        }
        "back" => Command::Back,
        "list" => Command::List,
        "lesson" => Command::Lesson(arg.ok_or(ParseError::Usage("lesson <id>"))?.to_string()),
        "story" => Command::Story,
        "song" => Command::Song,
        "quiz" => Command::Quiz,
        "speak" => Command::Speak,
        "pause" => Command::Pause,
        "record" => Command::Record,
        "stop" => Command::Stop,
        "cancel" => Command::Cancel,
        "draw" => Command::Draw,
        "abort" => Command::Abort,
        "exit" => Command::Exit,
        "quit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

impl Command {
    /// Buttons the lesson screen disables while a request is loading.
    pub fn is_lesson_action(&self) -> bool {
        matches!(
            self,
            Command::Story
                | Command::Song
                | Command::Quiz
                | Command::Speak
                | Command::Record
                | Command::Draw
        )
    }
}

#[derive(Debug)]
pub enum Outcome {
    Dispatch(Event),
    Print(String),
    Refuse(String),
    Quit,
}

/// Turn a command into a session event, or answer it directly.
pub fn translate(command: Command, session: &Session) -> Outcome {
    if command.is_lesson_action() && session.is_loading() {
        return Outcome::Refuse("the teacher is still thinking, please wait (or 'abort')".into());
    }
    if command.is_lesson_action() && session.showing_canvas() {
        return Outcome::Refuse("finish or close the coloring page first".into());
    }

    match command {
        Command::Help => Outcome::Print(HELP.to_string()),
        Command::List => match session.level() {
            Some(level) => Outcome::Print(lesson_list(level, session)),
            None => Outcome::Refuse("choose a level first: level kg1|kg2".into()),
        },
        Command::Quit => Outcome::Quit,
        Command::Lang => Outcome::Dispatch(Event::ToggleLanguage),
        Command::Level(level) => {
            if session.step() == Step::Lesson {
                Outcome::Refuse("leave the lesson first with 'exit'".into())
            } else {
                Outcome::Dispatch(Event::SelectLevel(level))
            }
        }
        Command::Back => Outcome::Dispatch(Event::BackToWelcome),
        Command::Lesson(id) => {
            let Some(level) = session.level() else {
                return Outcome::Refuse("choose a level first: level kg1|kg2".into());
            };
            match curriculum::find_lesson(level, &id) {
                Some(lesson) => Outcome::Dispatch(Event::SelectLesson(lesson)),
                None => Outcome::Refuse(format!("no lesson '{}' in {}, try 'list'", id, level.label())),
            }
        }
        Command::Exit => Outcome::Dispatch(Event::ExitLesson),
        Command::Abort => Outcome::Dispatch(Event::CancelPending),
        Command::Pause => Outcome::Dispatch(Event::TogglePause),
        Command::Stop => Outcome::Dispatch(Event::StopRecording),
        Command::Cancel => Outcome::Dispatch(Event::CancelRecording),
        other => {
            if session.step() != Step::Lesson {
                return Outcome::Refuse("open a lesson first: lesson <id>".into());
            }
            match other {
                Command::Story => Outcome::Dispatch(Event::RequestStory),
                Command::Song => Outcome::Dispatch(Event::RequestSong),
                Command::Quiz => Outcome::Dispatch(Event::RequestQuiz),
                Command::Record => Outcome::Dispatch(Event::StartRecording),
                Command::Draw => Outcome::Dispatch(Event::RequestDraw),
                _ => {
                    if session.can_request_speech() {
                        Outcome::Dispatch(Event::RequestSpeech)
                    } else {
                        Outcome::Refuse("nothing new to read aloud".into())
                    }
                }
            }
        }
    }
}

fn lesson_list(level: Level, session: &Session) -> String {
    let language = session.language();
    let mut out = String::new();
    for theme in curriculum::themes(level) {
        out.push_str(&format!("{}\n", theme.title.get(language)));
        for chapter in theme.chapters {
            out.push_str(&format!("  {}\n", chapter.title.get(language)));
            for lesson in chapter.lessons {
                out.push_str(&format!(
                    "    {:<4} {} ({:?})\n",
                    lesson.id,
                    lesson.title.get(language),
                    lesson.kind
                ));
            }
        }
    }
    out.trim_end().to_string()
}

/// What the shell last showed, to print only changes.
#[derive(Debug, Clone, Default, PartialEq)]
struct Snapshot {
    step: Option<Step>,
    lesson: Option<&'static str>,
    view: Option<View>,
    phase: Option<Phase>,
    listening: bool,
    speaking: bool,
    paused: bool,
    awaiting_answer: bool,
    transcript: Option<String>,
    ai_text: Option<String>,
}

#[derive(Default)]
pub struct Printer {
    last: Snapshot,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines describing what became visible since the previous call.
    pub fn render(&mut self, session: &Session) -> Vec<String> {
        let language = session.language();
        let now = Snapshot {
            step: Some(session.step()),
            lesson: session.lesson().map(|l| l.id),
            view: Some(session.view()),
            phase: Some(session.phase()),
            listening: session.is_listening(),
            speaking: session.is_speaking(),
            paused: session.is_paused(),
            awaiting_answer: session.pending_question().is_some(),
            transcript: session.response().child_transcript.clone(),
            ai_text: session.response().ai_text.clone(),
        };
        let mut lines = Vec::new();

        if now.step != self.last.step || now.lesson != self.last.lesson {
            lines.push(match session.step() {
                Step::Welcome => "== Welcome! choose a level: level kg1|kg2 ==".to_string(),
                Step::Curriculum => format!(
                    "== {} lessons: type 'list' ==",
                    session.level().map(|l| l.label()).unwrap_or("?")
                ),
                Step::Lesson => match session.lesson() {
                    Some(lesson) => format!(
                        "== {} ==\n{}",
                        lesson.title.get(language),
                        lesson.description.get(language)
                    ),
                    None => String::new(),
                },
            });
        }

        if now.phase != self.last.phase {
            match session.phase() {
                Phase::Loading => lines.push("... the teacher is thinking".to_string()),
                Phase::Canvas => {
                    lines.push("[coloring page open: draw, then Enter to finish]".to_string())
                }
                _ => {}
            }
        }

        if now.listening && !self.last.listening {
            lines.push("[listening... 'stop' to send, 'cancel' to discard]".to_string());
        }

        if now.transcript != self.last.transcript {
            if let Some(ref t) = now.transcript {
                lines.push(format!("child> {}", t));
            }
        }
        if now.ai_text != self.last.ai_text || now.view != self.last.view {
            if let Some(ref t) = now.ai_text {
                lines.push(format!("teacher ({:?})> {}", session.view(), t));
            }
        }

        if now.awaiting_answer && !self.last.awaiting_answer {
            lines.push("[answer out loud: 'record', then 'stop']".to_string());
        }

        if now.speaking != self.last.speaking || now.paused != self.last.paused {
            if now.speaking {
                lines.push("[speaking]".to_string());
            } else if now.paused {
                lines.push("[paused]".to_string());
            }
        }

        self.last = now;
        lines.retain(|l| !l.is_empty());
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GatewayReply;
    use crate::curriculum::Language;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("LEVEL kg2"), Ok(Some(Command::Level(Level::Kg2))));
        assert_eq!(parse("lesson l12"), Ok(Some(Command::Lesson("l12".into()))));
        assert_eq!(parse(" record "), Ok(Some(Command::Record)));
        assert_eq!(parse("level kg3"), Err(ParseError::Usage("level kg1|kg2")));
        assert_eq!(parse("lesson"), Err(ParseError::Usage("lesson <id>")));
        assert_eq!(parse("dance"), Err(ParseError::Unknown("dance".into())));
    }

    #[test]
    fn test_lesson_actions_refused_while_loading() {
        let mut session = Session::new(Language::En);
        session.apply(Event::SelectLevel(Level::Kg1));
        let Outcome::Dispatch(event) = translate(Command::Lesson("l1".into()), &session) else {
            panic!("lesson l1 should dispatch");
        };
        session.apply(event);
        assert!(session.is_loading());

        assert!(matches!(translate(Command::Quiz, &session), Outcome::Refuse(_)));
        assert!(matches!(translate(Command::Record, &session), Outcome::Refuse(_)));
        assert!(matches!(
            translate(Command::Abort, &session),
            Outcome::Dispatch(Event::CancelPending)
        ));
        assert!(matches!(
            translate(Command::Exit, &session),
            Outcome::Dispatch(Event::ExitLesson)
        ));
    }

    #[test]
    fn test_printer_prompts_for_quiz_answer() {
        let mut printer = Printer::new();
        let mut session = Session::new(Language::En);
        session.apply(Event::SelectLevel(Level::Kg1));
        session.apply(Event::SelectLesson(curriculum::find_lesson(Level::Kg1, "l1").unwrap()));
        session.apply(Event::RequestQuiz);
        printer.render(&session);

        let generation = session.generation();
        session.apply(Event::Completed {
            generation,
            result: Ok(GatewayReply::Text("What color is the sky?".into())),
        });
        let lines = printer.render(&session);
        assert!(lines.contains(&"teacher (Quiz)> What color is the sky?".to_string()));
        assert!(lines.iter().any(|l| l.contains("'record'")));
        assert!(!printer.render(&session).iter().any(|l| l.contains("'record'")));
    }

    #[test]
    fn test_lesson_actions_refused_while_coloring() {
        let mut session = Session::new(Language::En);
        session.apply(Event::SelectLevel(Level::Kg1));
        session.apply(Event::SelectLesson(curriculum::find_lesson(Level::Kg1, "l1").unwrap()));
        let generation = session.generation();
        session.apply(Event::Completed {
            generation,
            result: Ok(GatewayReply::Text("Colors are fun!".into())),
        });
        session.apply(Event::RequestDraw);
        let generation = session.generation();
        session.apply(Event::Completed {
            generation,
            result: Ok(GatewayReply::Image(Some(vec![1, 2, 3]))),
        });
        assert!(session.showing_canvas());

        for command in [Command::Record, Command::Speak, Command::Story, Command::Draw] {
            assert!(matches!(translate(command, &session), Outcome::Refuse(_)));
        }
        assert!(matches!(
            translate(Command::Exit, &session),
            Outcome::Dispatch(Event::ExitLesson)
        ));
    }

    #[test]
    fn test_translate_requires_context() {
        let session = Session::new(Language::En);
        assert!(matches!(translate(Command::List, &session), Outcome::Refuse(_)));
        assert!(matches!(
            translate(Command::Lesson("l1".into()), &session),
            Outcome::Refuse(_)
        ));
        assert!(matches!(translate(Command::Story, &session), Outcome::Refuse(_)));
        assert!(matches!(translate(Command::Quit, &session), Outcome::Quit));

        let mut session = Session::new(Language::En);
        session.apply(Event::SelectLevel(Level::Kg2));
        // l1 belongs to KG1
        assert!(matches!(
            translate(Command::Lesson("l1".into()), &session),
            Outcome::Refuse(_)
        ));
        let Outcome::Print(list) = translate(Command::List, &session) else {
            panic!("list should print");
        };
        assert!(list.contains("l11"));
        assert!(!list.contains("l1 "));
    }

    #[test]
    fn test_printer_shows_changes_once() {
        let mut printer = Printer::new();
        let mut session = Session::new(Language::En);
        assert_eq!(printer.render(&session).len(), 1);
        assert!(printer.render(&session).is_empty());

        session.apply(Event::SelectLevel(Level::Kg1));
        session.apply(Event::SelectLesson(curriculum::find_lesson(Level::Kg1, "l1").unwrap()));
        let lines = printer.render(&session);
        assert!(lines[0].contains("My Beautiful Things"));
        assert!(lines.iter().any(|l| l.contains("thinking")));

        let generation = session.generation();
        session.apply(Event::Completed {
            generation,
            result: Ok(GatewayReply::Text("Colors are fun!".into())),
        });
        assert_eq!(
            printer.render(&session),
            vec!["teacher (Explanation)> Colors are fun!".to_string()]
        );
    }
}
