//! Periodic table data and the closed vocabularies used by the classifier.

/// Element symbols, 118 plus `Uue`.
pub static ELEMENTS: [&str; 119] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og", "Uue",
];

/// Lowercase element names, same order as [`ELEMENTS`].
pub static ELEMENT_NAMES: [&str; 119] = [
    "hydrogen", "helium", "lithium", "beryllium", "boron", "carbon", "nitrogen", "oxygen",
    "fluorine", "neon", "sodium", "magnesium", "aluminium", "silicon", "phosphorus", "sulfur",
    "chlorine", "argon", "potassium", "calcium", "scandium", "titanium", "vanadium", "chromium",
    "manganese", "iron", "cobalt", "nickel", "copper", "zinc", "gallium", "germanium", "arsenic",
    "selenium", "bromine", "krypton", "rubidium", "strontium", "yttrium", "zirconium", "niobium",
    "molybdenum", "technetium", "ruthenium", "rhodium", "palladium", "silver", "cadmium",
    "indium", "tin", "antimony", "tellurium", "iodine", "xenon", "cesium", "barium", "lanthanum",
    "cerium", "praseodymium", "neodymium", "promethium", "samarium", "europium", "gadolinium",
    "terbium", "dysprosium", "holmium", "erbium", "thulium", "ytterbium", "lutetium", "hafnium",
    "tantalum", "tungsten", "rhenium", "osmium", "iridium", "platinum", "gold", "mercury",
    "thallium", "lead", "bismuth", "polonium", "astatine", "radon", "francium", "radium",
    "actinium", "thorium", "protactinium", "uranium", "neptunium", "plutonium", "americium",
    "curium", "berkelium", "californium", "einsteinium", "fermium", "mendelevium", "nobelium",
    "lawrencium", "rutherfordium", "dubnium", "seaborgium", "bohrium", "hassium", "meitnerium",
    "darmstadtium", "roentgenium", "copernicium", "nihonium", "flerovium", "moscovium",
    "livermorium", "tennessine", "oganesson", "ununennium",
];

/// Electronegativity-style ordering from Table VI of the IUPAC 2005
/// inorganic nomenclature recommendations.
static IUPAC_ORDER: [&str; 119] = [
    "Rn", "Xe", "Kr", "Ar", "Ne", "He", "Fr", "Cs", "Rb", "K", "Na", "Li", "Ra", "Ba", "Sr", "Ca",
    "Mg", "Be", "Lr", "No", "Md", "Fm", "Es", "Cf", "Bk", "Cm", "Am", "Pu", "Np", "U", "Pa", "Th",
    "Ac", "Lu", "Yb", "Tm", "Er", "Ho", "Dy", "Tb", "Gd", "Eu", "Sm", "Pm", "Nd", "Pr", "Ce", "La",
    "Y", "Sc", "Rf", "Hf", "Zr", "Ti", "Db", "Ta", "Nb", "V", "Sg", "W", "Mo", "Cr", "Bh", "Re",
    "Tc", "Mn", "Hs", "Os", "Ru", "Fe", "Mt", "Ir", "Rh", "Co", "Ds", "Pt", "Pd", "Ni", "Rg", "Au",
    "Ag", "Cu", "Cn", "Hg", "Cd", "Zn", "Nh", "Tl", "In", "Ga", "Al", "B", "Fl", "Pb", "Sn", "Ge",
    "Si", "C", "Mc", "Bi", "Sb", "As", "P", "N", "H", "Lv", "Po", "Te", "Se", "S", "O", "Ts", "At",
    "I", "Br", "Cl", "F", "Og", "Uue",
];

/// Transition metals used for abbreviation and raw-material decisions.
pub static TRANSITION_METALS: [&str; 38] = [
    "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh",
    "Pd", "Ag", "Cd", "Lu", "Hf", "Ta", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Lr", "Rf", "Db", "Sg",
    "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
];

/// First-row transition metals
pub static TRANSITION_METALS_3D: [&str; 10] =
    ["Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn"];

/// Battery-relevant alkali metals
pub static BATTERY_METALS: [&str; 2] = ["Na", "Li"];

/// Carbon, hydrogen, oxygen: the elements of a plain organic solvent
pub static ORGANIC_ELEMENTS: [&str; 3] = ["C", "H", "O"];

pub static POLYATOMIC_IONS: [&str; 12] = [
    "CO3", "PO4", "PO3", "P2O7", "NH4", "NO3", "NO2", "SO4", "SO3", "OH", "CN", "SiO4",
];

/// Ions and acronyms that keep a formula from being treated as an abbreviation.
pub static IONS: [&str; 28] = [
    "H2PO4", "HPO4", "HCO3", "HSO4", "HSO3", "C2O4", "CO3", "PO4", "PO3", "NH4", "NO3", "NO2",
    "SO4", "SO3", "OH", "CN", "O", "H", "N", "C", "F", "S", "B", "P", "Cl", "Org", "Ac", "Elem",
];

/// Acronyms that legitimately contain three or more capitals in a row
pub static CHEMICAL_ACRONYMS: [&str; 4] = ["CH", "COO", "OH", "NH"];

/// Placeholder slot names accepted in place of a real element.
pub static SLOTS: [&str; 3] = ["M", "Ln", "Me"];

pub const VACANCY: char = '□';

/// Stoichiometric variable letters recognized during valence stripping
pub static VARIABLES: [char; 4] = ['x', 'y', 'z', 'δ'];

pub static SIMPLE_COMPOUNDS: [&str; 6] = ["NaHO", "NaCl", "NaF", "NaBr", "Na2S2", "Na2CO3"];

pub static SOLVENT_NAMES: [&str; 4] = ["ethanol", "dimethylformamide", "methyl", "pyrrolidone"];

pub static RAW_MATERIALS: [&str; 15] = [
    "CH3COO", "OCH2CH3", "OAc", "NO", "CO3", "OH", "SO4", "NH2", "BO3", "NH3", "NH4", "CTAB",
    "transition", "Nitrates", "H2O",
];

pub static APPARATUS: [&str; 11] = [
    "XRD", "XPS", "SEM", "EDS", "TEM", "ESI", "XAS", "EXAFS", "AFM", "UV", "XANES",
];

/// Tokens that are never materials
pub static OTHER: [&str; 30] = [
    "JCPDS", "JCPSD", "RT", "SOC", "ICP", "SIB", "DFT", "STA", "ICSD", "HITACH", "NIST", "PAL",
    "TXM", "SXRPD", "PVDF", "DFPT", "CNTs", "USP", "ALD", "PH3", "CV", "CS", "PC", "OC", "CB",
    "ND", "TG", "NPs", "Na-rich", "Na-ion",
];

/// Substrings that mark a token as not a material
pub static OTHER_FRAGMENTS: [&str; 7] = ["PDF", "No.", "↔", "Nae", "Fig", "AB", "Non"];

/// Word shapes typical of sample abbreviations
pub static ABBREVIATION_SHAPES: [&str; 5] = ["XXdd", "XXX", "XXd", "XxXX", "Xddd"];

pub fn is_element(symbol: &str) -> bool {
    ELEMENTS.contains(&symbol)
}

/// One-letter element symbol check on a single character
pub fn is_single_letter_element(c: char) -> bool {
    ELEMENTS
        .iter()
        .any(|e| e.len() == 1 && e.starts_with(c))
}

pub fn is_two_letter_element(symbol: &str) -> bool {
    symbol.len() == 2 && is_element(symbol)
}

/// Symbol for an element name, either all-lowercase or capitalized.
pub fn element_by_name(name: &str) -> Option<&'static str> {
    ELEMENT_NAMES
        .iter()
        .position(|n| *n == name || capitalize(n) == name)
        .map(|i| ELEMENTS[i])
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Position in the IUPAC electronegativity ordering, `None` for non-elements.
pub fn iupac_rank(symbol: &str) -> Option<usize> {
    IUPAC_ORDER.iter().position(|e| *e == symbol)
}

pub fn is_transition_metal(symbol: &str) -> bool {
    TRANSITION_METALS.contains(&symbol)
}

/// Transition metals plus Mg, Al and the alkali battery metals
pub fn is_battery_family(symbol: &str) -> bool {
    is_transition_metal(symbol) || matches!(symbol, "Mg" | "Al") || BATTERY_METALS.contains(&symbol)
}

pub fn is_polyatomic_ion(text: &str) -> bool {
    POLYATOMIC_IONS.contains(&text)
}

/// Real element, placeholder slot or vacancy
pub fn is_composition_key(key: &str) -> bool {
    is_element(key) || SLOTS.contains(&key) || key.starts_with(VACANCY)
}

/// Greek lowercase letters α through ω, the range accepted as variables
pub fn is_greek(c: char) -> bool {
    ('\u{3b1}'..='\u{3c9}').contains(&c)
}

/// Lowercase Latin or Greek letter usable as a stoichiometric variable
pub fn is_variable_char(c: char) -> bool {
    c.is_ascii_lowercase() || is_greek(c)
}
