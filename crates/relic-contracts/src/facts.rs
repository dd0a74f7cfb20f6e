use rand::Rng;

pub const FACTS: [&str; 10] = [
    "The Great Pyramid of Giza was originally covered in highly polished white limestone, making it shine brilliantly in the sun.",
    "Cleopatra lived closer in time to the first moon landing than to the construction of the pyramids.",
    "The shortest war in history was between Britain and Zanzibar on August 27, 1896. Zanzibar surrendered after just 38 minutes.",
    "Napoleon was once attacked by a horde of rabbits during a hunting party.",
    "The Olympics in ancient Greece included events like chariot racing and a foot race where men competed in full armor.",
    "Viking warriors did not actually wear horned helmets; that myth was created by 19th-century artists.",
    "The library of Alexandria was not just a library but a major research center with scholars, botanists, and astronomers.",
    "Medieval knights practiced a form of wrestling called 'Fight Book' and had to be skilled in unarmed combat.",
    "The Bayeux Tapestry is actually an embroidery, not a tapestry, and it is nearly 70 meters long.",
    "Leonardo da Vinci could write with one hand and draw with the other simultaneously.",
];

/// Uniform draw from [`FACTS`].
pub fn random_fact<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    FACTS[rng.gen_range(0..FACTS.len())]
}
