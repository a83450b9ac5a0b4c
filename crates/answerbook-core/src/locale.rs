//! Supported display languages and the per-language seed data for the
//! default book.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Zh,
    En,
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Locale::Zh => "zh",
            Locale::En => "en",
        }
    }

    /// Name given to the bootstrapped default book.
    pub fn default_book_name(&self) -> &'static str {
        match self {
            Locale::Zh => "預設解答之書",
            Locale::En => "Default Book of Answers",
        }
    }

    /// Answers seeded into the default book on first use.
    pub fn seed_answers(&self) -> &'static [&'static str] {
        match self {
            Locale::Zh => SEED_ZH,
            Locale::En => SEED_EN,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "zh-tw" | "zh-hant" => Ok(Locale::Zh),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            other => Err(format!("Unsupported locale: {}", other)),
        }
    }
}

const SEED_ZH: &[&str] = &[
    "毫無疑問。",
    "這很可能。",
    "你說得對。",
    "所有的跡象都指向「是」。",
    "大膽去嘗試吧。",
    "信賴你的直覺。",
    "前景一片光明。",
    "絕對可以！",
    "這將會發生。",
    "你內心的聲音是對的。",
    "相信你自己。",
    "這是個好主意。",
    "現在正是時候。",
    "成功就在眼前。",
    "答案是肯定的。",
    "機會就在那裡。",
    "勇敢地前進吧。",
    "一切都會順利。",
    "相信你的心。",
    "這將會是個驚喜。",
    "運氣會站在你這邊。",
    "當然，為什麼不呢？",
    "答案顯而易見。",
    "相信時機。",
    "跟隨光明。",
    "不要指望它。",
    "我的回答是否定的。",
    "最好不要。",
    "現在最好不要透露。",
    "答案不明確，再問一次。",
    "專注於其他事情。",
    "這是個壞主意。",
    "暫緩行動，重新思考。",
    "現在不是最佳時機。",
    "未來並不樂觀。",
    "不，你應該換個方向。",
    "忘了它吧。",
    "保持現狀。",
    "還有更好的選擇。",
    "另尋他法。",
    "這會帶來麻煩。",
    "最好還是別冒險。",
    "你應該再等等。",
    "這需要更多考慮。",
    "答案是否定的。",
    "拭目以待。",
    "問問你自己的心。",
    "答案在你心中。",
    "未來是個謎。",
    "只有時間會告訴你。",
    "換個方式再問一次。",
    "集中精神，再問一次。",
    "答案就在你身邊。",
    "這是個深奧的問題。",
    "答案還未浮現。",
    "命運還在書寫中。",
    "不要急著尋找答案。",
    "答案比你想像的更複雜。",
    "這取決於你的選擇。",
    "傾聽周遭的聲音。",
    "尋求不同的觀點。",
    "等待宇宙的訊息。",
    "答案會在適當的時候出現。",
    "現在還不是知道的時候。",
    "保持開放的心態。",
    "做好準備。",
    "勇敢地面對它。",
    "踏出第一步。",
    "保持耐心。",
    "改變你的視角。",
    "尋求幫助。",
    "順其自然。",
    "享受這個過程。",
    "找到平衡點。",
    "釋放你的恐懼。",
    "專注於當下。",
    "整理你的思緒。",
    "學習新事物。",
    "保持謙遜。",
    "做出一個決定。",
    "擁抱未知。",
    "重新評估。",
    "傾聽你的身體。",
    "休息一下。",
    "活在當下。",
    "答案就在你眼前，只是你沒看到。",
    "當然，只要你願意。",
    "星星說「也許」。",
    "這很明顯，不是嗎？",
    "去吃點好吃的，你會得到答案。",
    "答案在風中飄盪。",
    "你可能需要一杯咖啡。",
    "這是一個很好的問題。",
    "答案是個秘密。",
    "答案就在書裡。",
    "這需要一個更強大的力量來回答。",
    "相信魔法。",
    "答案就在你的夢裡。",
    "讓宇宙決定吧。",
    "答案在明天的咖啡裡。",
];

const SEED_EN: &[&str] = &[
    "Without a doubt.",
    "It is very likely.",
    "You are right.",
    "All signs point to yes.",
    "Go for it boldly.",
    "Trust your instincts.",
    "The outlook is bright.",
    "Absolutely!",
    "It will happen.",
    "Your inner voice is correct.",
    "Believe in yourself.",
    "This is a good idea.",
    "Now is the time.",
    "Success is within reach.",
    "The answer is yes.",
    "The opportunity is there.",
    "Move forward bravely.",
    "Everything will go smoothly.",
    "Trust your heart.",
    "This will be a surprise.",
    "Luck will be on your side.",
    "Sure, why not?",
    "The answer is clear.",
    "Trust the timing.",
    "Follow the light.",
    "Don't count on it.",
    "My answer is no.",
    "Better not.",
    "Better not tell now.",
    "Reply hazy, try again.",
    "Focus on something else.",
    "This is a bad idea.",
    "Pause and reconsider.",
    "Now is not the best time.",
    "The future doesn't look good.",
    "No, you should change direction.",
    "Forget about it.",
    "Maintain the status quo.",
    "There are better options.",
    "Look for another way.",
    "This will cause trouble.",
    "Better not take the risk.",
    "You should wait.",
    "This needs more consideration.",
    "The answer is no.",
    "Wait and see.",
    "Ask your own heart.",
    "The answer is within you.",
    "The future is a mystery.",
    "Only time will tell.",
    "Ask in a different way.",
    "Concentrate and ask again.",
    "The answer is around you.",
    "This is a profound question.",
    "The answer hasn't emerged yet.",
    "Fate is still being written.",
    "Don't rush to find the answer.",
    "The answer is more complex than you think.",
    "It depends on your choice.",
    "Listen to the voices around you.",
    "Seek different perspectives.",
    "Wait for the universe's message.",
    "The answer will appear at the right time.",
    "Now is not the time to know.",
    "Keep an open mind.",
    "Be prepared.",
    "Face it bravely.",
    "Take the first step.",
    "Be patient.",
    "Change your perspective.",
    "Seek help.",
    "Go with the flow.",
    "Enjoy the process.",
    "Find balance.",
    "Release your fears.",
    "Focus on the present.",
    "Organize your thoughts.",
    "Learn something new.",
    "Stay humble.",
    "Make a decision.",
    "Embrace the unknown.",
    "Reassess.",
    "Listen to your body.",
    "Take a break.",
    "Live in the present.",
    "The answer is right in front of you, you just don't see it.",
    "Of course, if you want to.",
    "The stars say maybe.",
    "Isn't it obvious?",
    "Go eat something good, you'll get the answer.",
    "The answer is floating in the wind.",
    "You might need a cup of coffee.",
    "That's a good question.",
    "The answer is a secret.",
    "The answer is in the book.",
    "This requires a more powerful force to answer.",
    "Believe in magic.",
    "The answer is in your dreams.",
    "Let the universe decide.",
    "The answer is in tomorrow's coffee.",
];
