//! Discover kindergarten curriculum: levels → themes → chapters → lessons.
//!
//! Static, read-only data. The session only ever borrows a `&'static Lesson`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ar,
    En,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::Ar => "ar",
            Language::En => "en",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::Ar => Language::En,
            Language::En => Language::Ar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "KG1")]
    Kg1,
    #[serde(rename = "KG2")]
    Kg2,
}

impl Level {
    /// Age of the child the AI content is written for.
    pub fn age(self) -> u8 {
        match self {
            Level::Kg1 => 4,
            Level::Kg2 => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Level::Kg1 => "KG1",
            Level::Kg2 => "KG2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kg1" | "1" => Some(Level::Kg1),
            "kg2" | "2" => Some(Level::Kg2),
            _ => None,
        }
    }
}

/// A string in both curriculum languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Localized {
    pub ar: &'static str,
    pub en: &'static str,
}

impl Localized {
    pub fn get(&self, language: Language) -> &'static str {
        match language {
            Language::Ar => self.ar,
            Language::En => self.en,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonKind {
    Story,
    Activity,
    Experiment,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Lesson {
    pub id: &'static str,
    pub title: Localized,
    pub description: Localized,
    pub kind: LessonKind,
}

#[derive(Debug)]
pub struct Chapter {
    pub id: &'static str,
    pub title: Localized,
    pub lessons: &'static [Lesson],
}

#[derive(Debug)]
pub struct Theme {
    pub id: &'static str,
    pub title: Localized,
    pub chapters: &'static [Chapter],
}

const fn l(ar: &'static str, en: &'static str) -> Localized {
    Localized { ar, en }
}

static KG1: &[Theme] = &[
    Theme {
        id: "t1_kg1",
        title: l("من أكون؟", "Who Am I?"),
        chapters: &[
            Chapter {
                id: "c1",
                title: l("أعرفني", "Knowing Me"),
                lessons: &[
                    Lesson {
                        id: "l1",
                        title: l("أشيائي الجميلة", "My Beautiful Things"),
                        description: l(
                            "التعرف على الأشياء الشخصية والألوان",
                            "Identifying personal belongings and colors",
                        ),
                        kind: LessonKind::Activity,
                    },
                    Lesson {
                        id: "l2",
                        title: l("قصة عائلتي", "My Family Story"),
                        description: l("التعرف على أفراد الأسرة", "Meet family members"),
                        kind: LessonKind::Story,
                    },
                ],
            },
            Chapter {
                id: "c2",
                title: l("شجري المفضل", "My Favorite Trees"),
                lessons: &[
                    Lesson {
                        id: "l3",
                        title: l("أجزاء النبات", "Plant Parts"),
                        description: l("كيف ينمو النبات", "How plants grow"),
                        kind: LessonKind::Experiment,
                    },
                    Lesson {
                        id: "l4",
                        title: l("دورة حياة البذرة", "Seed Life Cycle"),
                        description: l("من البذرة إلى الثمرة", "From seed to fruit"),
                        kind: LessonKind::Story,
                    },
                ],
            },
        ],
    },
    Theme {
        id: "t2_kg1",
        title: l("العالم من حولي", "World Around Me"),
        chapters: &[Chapter {
            id: "c3",
            title: l("بيئتي", "My Environment"),
            lessons: &[
                Lesson {
                    id: "l5",
                    title: l("الحيوانات في المزرعة", "Farm Animals"),
                    description: l("أصوات وأشكال الحيوانات", "Animal sounds and shapes"),
                    kind: LessonKind::Activity,
                },
                Lesson {
                    id: "l6",
                    title: l("الطقس اليوم", "Today's Weather"),
                    description: l("الفصول الأربعة والملابس", "Four seasons and clothes"),
                    kind: LessonKind::Activity,
                },
            ],
        }],
    },
    Theme {
        id: "t3_kg1",
        title: l("كيف يعمل العالم؟", "How the World Works"),
        chapters: &[Chapter {
            id: "c4",
            title: l("المواد والاشياء", "Materials"),
            lessons: &[
                Lesson {
                    id: "l7",
                    title: l("الطفو والغوص", "Sink or Float"),
                    description: l("تجربة الماء والاجسام", "Water experiment"),
                    kind: LessonKind::Experiment,
                },
                Lesson {
                    id: "l8",
                    title: l("الناعم والخشن", "Smooth vs Rough"),
                    description: l("حاسة اللمس", "Sense of touch"),
                    kind: LessonKind::Activity,
                },
            ],
        }],
    },
    Theme {
        id: "t4_kg1",
        title: l("التواصل", "Communication"),
        chapters: &[Chapter {
            id: "c5",
            title: l("عبر عن نفسك", "Express Yourself"),
            lessons: &[
                Lesson {
                    id: "l9",
                    title: l("لغة الجسد", "Body Language"),
                    description: l("كيف نعبر عن مشاعرنا", "Expressing feelings"),
                    kind: LessonKind::Story,
                },
                Lesson {
                    id: "l10",
                    title: l("الموسيقى والأصوات", "Music and Sounds"),
                    description: l("صناعة آلة موسيقية", "Making an instrument"),
                    kind: LessonKind::Activity,
                },
            ],
        }],
    },
];

static KG2: &[Theme] = &[
    Theme {
        id: "t1_kg2",
        title: l("من أكون؟", "Who Am I?"),
        chapters: &[Chapter {
            id: "c6",
            title: l("أنا أكبر", "I Am Growing"),
            lessons: &[
                Lesson {
                    id: "l11",
                    title: l("أعضاء جسمي", "My Body Organs"),
                    description: l("القلب والرئتين", "Heart and lungs"),
                    kind: LessonKind::Activity,
                },
                Lesson {
                    id: "l12",
                    title: l("العادات الصحية", "Healthy Habits"),
                    description: l("الغذاء الصحي والرياضة", "Healthy food and sports"),
                    kind: LessonKind::Activity,
                },
            ],
        }],
    },
    Theme {
        id: "t2_kg2",
        title: l("العالم من حولي", "World Around Me"),
        chapters: &[Chapter {
            id: "c7",
            title: l("سكان العالم", "World Citizens"),
            lessons: &[
                Lesson {
                    id: "l13",
                    title: l("خرائط ومواقع", "Maps and Locations"),
                    description: l("أين أعيش؟", "Where do I live?"),
                    kind: LessonKind::Activity,
                },
                Lesson {
                    id: "l14",
                    title: l("الماء سر الحياة", "Water is Life"),
                    description: l("ترشيد الاستهلاك", "Saving water"),
                    kind: LessonKind::Experiment,
                },
            ],
        }],
    },
    Theme {
        id: "t3_kg2",
        title: l("كيف يعمل العالم؟", "How the World Works"),
        chapters: &[Chapter {
            id: "c8",
            title: l("السوق والمجتمع", "Market & Community"),
            lessons: &[
                Lesson {
                    id: "l15",
                    title: l("النقود والميزانية", "Money and Budget"),
                    description: l("البيع والشراء", "Buying and selling"),
                    kind: LessonKind::Activity,
                },
                Lesson {
                    id: "l16",
                    title: l("المهن والوظائف", "Jobs and Careers"),
                    description: l("من يساعدنا في المجتمع؟", "Who helps us?"),
                    kind: LessonKind::Story,
                },
            ],
        }],
    },
    Theme {
        id: "t4_kg2",
        title: l("التواصل", "Communication"),
        chapters: &[Chapter {
            id: "c9",
            title: l("نقل المعلومات", "Transferring Info"),
            lessons: &[
                Lesson {
                    id: "l17",
                    title: l("الرسائل والبريد", "Mail and Letters"),
                    description: l("كيف نتواصل قديماً وحديثاً", "Past and present communication"),
                    kind: LessonKind::Activity,
                },
                Lesson {
                    id: "l18",
                    title: l("وسائل المواصلات", "Transportation"),
                    description: l("تواصل المدن", "Connecting cities"),
                    kind: LessonKind::Activity,
                },
            ],
        }],
    },
];

pub fn themes(level: Level) -> &'static [Theme] {
    match level {
        Level::Kg1 => KG1,
        Level::Kg2 => KG2,
    }
}

pub fn lessons(level: Level) -> impl Iterator<Item = &'static Lesson> {
    themes(level)
        .iter()
        .flat_map(|theme| theme.chapters.iter())
        .flat_map(|chapter| chapter.lessons.iter())
}

pub fn find_lesson(level: Level, id: &str) -> Option<&'static Lesson> {
    lessons(level).find(|lesson| lesson.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_each_level_has_four_themes() {
        assert_eq!(themes(Level::Kg1).len(), 4);
        assert_eq!(themes(Level::Kg2).len(), 4);
    }

    #[test]
    fn test_lesson_ids_are_unique_across_levels() {
        let ids: Vec<&str> = lessons(Level::Kg1)
            .chain(lessons(Level::Kg2))
            .map(|lesson| lesson.id)
            .collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 18);
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_find_lesson_is_scoped_to_level() {
        let lesson = find_lesson(Level::Kg1, "l7").unwrap();
        assert_eq!(lesson.title.get(Language::En), "Sink or Float");
        assert_eq!(lesson.kind, LessonKind::Experiment);
        assert!(find_lesson(Level::Kg2, "l7").is_none());
        assert!(find_lesson(Level::Kg2, "l14").is_some());
    }

    #[test]
    fn test_age_follows_level() {
        assert_eq!(Level::Kg1.age(), 4);
        assert_eq!(Level::Kg2.age(), 5);
    }

    #[test]
    fn test_level_parse_and_language_toggle() {
        assert_eq!(Level::parse("KG2"), Some(Level::Kg2));
        assert_eq!(Level::parse("kg3"), None);
        assert_eq!(Language::Ar.toggled(), Language::En);
        assert_eq!(Language::En.toggled().code(), "ar");
    }
}
