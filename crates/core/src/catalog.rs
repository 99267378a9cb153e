use std::fmt;
use std::str::FromStr;

/// The riddle styles a player can pick from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Category {
    #[default]
    Funny,
    Mathematical,
    Detective,
    Mysterious,
    Themed,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Funny,
        Category::Mathematical,
        Category::Detective,
        Category::Mysterious,
        Category::Themed,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Category::Funny => "funny",
            Category::Mathematical => "mathematical",
            Category::Detective => "detective",
            Category::Mysterious => "mysterious",
            Category::Themed => "themed",
        }
    }

    /// The generation instruction handed to the model. Always English, the
    /// output language is requested separately.
    pub fn instruction(&self) -> &'static str {
        match self {
            Category::Funny => "funny riddle with a playful, surprising twist",
            Category::Mathematical => {
                "mathematical riddle that can be solved with simple arithmetic or logic"
            }
            Category::Detective => {
                "detective riddle in which the reader deduces who or what is responsible from a few clues"
            }
            Category::Mysterious => {
                "mysterious, atmospheric riddle that describes an ordinary thing in an eerie way"
            }
            Category::Themed => "riddle about nature, animals or everyday objects",
        }
    }

    pub fn label(&self, language: Language) -> &'static str {
        match (language, self) {
            (Language::German, Category::Funny) => "Lustig",
            (Language::German, Category::Mathematical) => "Mathematisch",
            (Language::German, Category::Detective) => "Detektiv",
            (Language::German, Category::Mysterious) => "Geheimnisvoll",
            (Language::German, Category::Themed) => "Thematisch",
            (Language::Russian, Category::Funny) => "Смешные",
            (Language::Russian, Category::Mathematical) => "Математические",
            (Language::Russian, Category::Detective) => "Детективные",
            (Language::Russian, Category::Mysterious) => "Загадочные",
            (Language::Russian, Category::Themed) => "Тематические",
            (Language::English, Category::Funny) => "Funny",
            (Language::English, Category::Mathematical) => "Mathematical",
            (Language::English, Category::Detective) => "Detective",
            (Language::English, Category::Mysterious) => "Mysterious",
            (Language::English, Category::Themed) => "Themed",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownId {
    kind: &'static str,
    value: String,
}

impl FromStr for Category {
    type Err = UnknownId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.id() == needle)
            .ok_or(UnknownId {
                kind: "category",
                value: s.to_string(),
            })
    }
}

/// The languages riddles are generated, judged and spoken in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Language {
    #[default]
    German,
    Russian,
    English,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::German, Language::Russian, Language::English];

    pub fn id(&self) -> &'static str {
        match self {
            Language::German => "de",
            Language::Russian => "ru",
            Language::English => "en",
        }
    }

    /// Locale tag passed to the speech service.
    pub fn locale(&self) -> &'static str {
        match self {
            Language::German => "de-DE",
            Language::Russian => "ru-RU",
            Language::English => "en-US",
        }
    }

    /// The language name as it appears inside prompts.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::German => "German",
            Language::Russian => "Russian",
            Language::English => "English",
        }
    }

    pub fn strings(&self) -> &'static UiStrings {
        match self {
            Language::German => &GERMAN,
            Language::Russian => &RUSSIAN,
            Language::English => &ENGLISH,
        }
    }

    /// Feedback for a wrong guess. Always carries the expected answer.
    pub fn incorrect_message(&self, answer: &str) -> String {
        format!("{} {}", self.strings().incorrect_prefix, answer)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = UnknownId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "de" | "german" | "deutsch" => Ok(Language::German),
            "ru" | "russian" | "русский" => Ok(Language::Russian),
            "en" | "english" => Ok(Language::English),
            _ => Err(UnknownId {
                kind: "language",
                value: s.to_string(),
            }),
        }
    }
}

/// Player-facing text for one language.
#[derive(Debug)]
pub struct UiStrings {
    pub title: &'static str,
    pub loading: &'static str,
    pub riddle_heading: &'static str,
    pub guess_prompt: &'static str,
    pub verifying: &'static str,
    pub correct: &'static str,
    pub incorrect_prefix: &'static str,
    pub could_not_verify: &'static str,
    pub fetch_failed: &'static str,
    pub retry_hint: &'static str,
    pub next_hint: &'static str,
    pub speaking: &'static str,
    pub category_heading: &'static str,
    pub language_heading: &'static str,
}

static GERMAN: UiStrings = UiStrings {
    title: "Rätselspiel",
    loading: "Rätsel wird geladen...",
    riddle_heading: "Rätsel:",
    guess_prompt: "Deine Antwort:",
    verifying: "Antwort wird geprüft...",
    correct: "Richtig! Gut gemacht.",
    incorrect_prefix: "Leider falsch. Die richtige Antwort ist:",
    could_not_verify: "Die Antwort konnte nicht überprüft werden.",
    fetch_failed: "Das Rätsel konnte nicht geladen werden. Bitte versuche es erneut.",
    retry_hint: "Tippe /new für einen neuen Versuch.",
    next_hint: "Tippe /new für das nächste Rätsel.",
    speaking: "(wird vorgelesen)",
    category_heading: "Kategorie",
    language_heading: "Sprache",
};

static RUSSIAN: UiStrings = UiStrings {
    title: "Игра в загадки",
    loading: "Загадка загружается...",
    riddle_heading: "Загадка:",
    guess_prompt: "Твой ответ:",
    verifying: "Проверяем ответ...",
    correct: "Правильно! Молодец.",
    incorrect_prefix: "К сожалению, неверно. Правильный ответ:",
    could_not_verify: "Не удалось проверить ответ.",
    fetch_failed: "Не удалось загрузить загадку. Попробуй ещё раз.",
    retry_hint: "Введи /new, чтобы попробовать снова.",
    next_hint: "Введи /new для следующей загадки.",
    speaking: "(озвучивается)",
    category_heading: "Категория",
    language_heading: "Язык",
};

static ENGLISH: UiStrings = UiStrings {
    title: "Riddle game",
    loading: "Loading riddle...",
    riddle_heading: "Riddle:",
    guess_prompt: "Your answer:",
    verifying: "Checking your answer...",
    correct: "Correct! Well done.",
    incorrect_prefix: "Not quite. The correct answer is:",
    could_not_verify: "Your answer could not be verified.",
    fetch_failed: "The riddle could not be loaded. Please try again.",
    retry_hint: "Type /new to try again.",
    next_hint: "Type /new for the next riddle.",
    speaking: "(speaking)",
    category_heading: "Category",
    language_heading: "Language",
};
