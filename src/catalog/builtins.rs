//! Built-in misconception taxonomy for primary and secondary mathematics.

use super::{MisconceptionCategory, MisconceptionEntry};
use MisconceptionCategory::*;

struct Row {
    taxonomy_id: &'static str,
    tag: &'static str,
    name: &'static str,
    category: MisconceptionCategory,
    description: &'static str,
    prerequisite_skills: &'static [&'static str],
    remediation_strategy: &'static str,
}

const TAXONOMY: &[Row] = &[
    Row {
        taxonomy_id: "misc_001",
        tag: "mult-makes-bigger",
        name: "Multiplication Always Makes Bigger",
        category: NumberOperations,
        description: "Learner believes multiplication always results in a larger number, failing with fractions/decimals < 1",
        prerequisite_skills: &["understanding of fractions", "decimal place value"],
        remediation_strategy: "Use visual models (area models, number lines). Practice with real-world contexts (half of something). Show that multiplication is repeated addition OR scaling.",
    },
    Row {
        taxonomy_id: "misc_002",
        tag: "div-makes-smaller",
        name: "Division Always Makes Smaller",
        category: NumberOperations,
        description: "Learner believes division always results in a smaller number, failing with fractions/decimals < 1",
        prerequisite_skills: &["understanding of fractions", "multiplication"],
        remediation_strategy: "Use sharing/grouping models. Ask 'how many halves in 10?' Build understanding of division as inverse multiplication.",
    },
    Row {
        taxonomy_id: "misc_003",
        tag: "order-of-operations",
        name: "Ignoring Order of Operations",
        category: NumberOperations,
        description: "Learner performs operations left-to-right without following BODMAS/PEMDAS",
        prerequisite_skills: &["basic operations"],
        remediation_strategy: "Teach BODMAS mnemonic. Use parentheses to make order explicit. Practice with real-world problems requiring specific order.",
    },
    Row {
        taxonomy_id: "misc_004",
        tag: "add-denominators",
        name: "Add/Subtract Fractions by Adding Denominators",
        category: Fractions,
        description: "Learner adds both numerators and denominators: 1/2 + 1/3 = 2/5",
        prerequisite_skills: &["fraction representation", "equivalent fractions"],
        remediation_strategy: "Use visual fraction models (circles, bars). Show that pieces must be same size. Practice finding equivalent fractions and common denominators.",
    },
    Row {
        taxonomy_id: "misc_005",
        tag: "larger-denominator-larger",
        name: "Larger Denominator Means Larger Fraction",
        category: Fractions,
        description: "Learner believes 1/8 > 1/4 because 8 > 4",
        prerequisite_skills: &["part-whole understanding"],
        remediation_strategy: "Use concrete materials (pizza slices, chocolate bars). Show that more pieces means smaller pieces. Compare with same-size wholes.",
    },
    Row {
        taxonomy_id: "misc_006",
        tag: "equivalence-one-part",
        name: "Denominator Confusion in Equivalence",
        category: Fractions,
        description: "Creates equivalent fractions by multiplying only numerator or only denominator",
        prerequisite_skills: &["multiplication", "fraction representation"],
        remediation_strategy: "Show that multiplying by n/n = 1. Use visual models showing whole divided into more pieces. Practice with concrete examples.",
    },
    Row {
        taxonomy_id: "misc_007",
        tag: "longer-decimal-larger",
        name: "Longer Decimal is Larger",
        category: Decimals,
        description: "Learner believes more decimal places means larger number: 0.234 > 0.5",
        prerequisite_skills: &["place value", "decimal notation"],
        remediation_strategy: "Use place value charts. Compare to money (R0.50 vs R0.08). Add zeros to show equivalence (0.5 = 0.500). Number line activities.",
    },
    Row {
        taxonomy_id: "misc_008",
        tag: "decimal-point-separator",
        name: "Decimal Point as Separator",
        category: Decimals,
        description: "Treats decimal point as separator between two whole numbers, not place value indicator",
        prerequisite_skills: &["place value", "fraction/decimal connection"],
        remediation_strategy: "Explicit place value teaching. Show connection to fractions (3.45 = 3 45/100). Use base-10 blocks. Practice reading and writing decimals.",
    },
    Row {
        taxonomy_id: "misc_009",
        tag: "variable-as-label",
        name: "Variable as Label Not Quantity",
        category: Algebra,
        description: "Learner treats variables as labels or abbreviations rather than quantities",
        prerequisite_skills: &["number sense", "patterns"],
        remediation_strategy: "Start with simple patterns. Use 'box' or '?' before introducing letters. Show same variable can have different values in different contexts.",
    },
    Row {
        taxonomy_id: "misc_010",
        tag: "equals-as-operator",
        name: "Equals Sign as 'Do Something'",
        category: Algebra,
        description: "Learner sees '=' as instruction to calculate, not balance/equivalence",
        prerequisite_skills: &["number relationships"],
        remediation_strategy: "Use balance scale metaphor. Show equations with operation on right (7 = 3 + 4). Practice true/false equations. Build relational understanding.",
    },
    Row {
        taxonomy_id: "misc_011",
        tag: "letter-number-separation",
        name: "Letter-Number Separation",
        category: Algebra,
        description: "Cannot combine or compare terms with variables and constants",
        prerequisite_skills: &["variable understanding", "like terms"],
        remediation_strategy: "Use concrete objects (x represents apples). Show that 3x means 3 groups of x. Practice with substitution to verify results.",
    },
    Row {
        taxonomy_id: "misc_012",
        tag: "orientation-changes-shape",
        name: "Orientation Affects Shape Identity",
        category: Geometry,
        description: "Learner believes rotated shapes are different shapes",
        prerequisite_skills: &["shape properties"],
        remediation_strategy: "Physical manipulation of shapes. Sort shapes in different orientations. Use dynamic geometry software. Focus on properties not appearance.",
    },
    Row {
        taxonomy_id: "misc_013",
        tag: "perimeter-area",
        name: "Perimeter-Area Confusion",
        category: Geometry,
        description: "Confuses or conflates perimeter and area concepts",
        prerequisite_skills: &["measurement", "formula application"],
        remediation_strategy: "Distinguish boundary (perimeter) from surface (area). Use real contexts (fencing vs. carpeting). Practice with grid paper. Emphasize units.",
    },
    Row {
        taxonomy_id: "misc_014",
        tag: "unit-conversion",
        name: "Ignoring Units in Conversion",
        category: Measurement,
        description: "Learner converts units incorrectly or drops units entirely",
        prerequisite_skills: &["multiplication/division", "place value"],
        remediation_strategy: "Use conversion charts. Practice with real measurements. Show relationship between units. Emphasize 'per' in rates. Always include units.",
    },
    Row {
        taxonomy_id: "misc_015",
        tag: "sampling-bias",
        name: "Representative Sampling Errors",
        category: Data,
        description: "Believes small/biased samples represent whole population",
        prerequisite_skills: &["data collection", "populations"],
        remediation_strategy: "Discuss sampling methods. Compare results from different samples. Show variability in small samples. Teach random sampling.",
    },
    Row {
        taxonomy_id: "misc_016",
        tag: "gamblers-fallacy",
        name: "Gambler's Fallacy",
        category: Data,
        description: "Believes past random events affect future independent events",
        prerequisite_skills: &["probability", "independence"],
        remediation_strategy: "Simulate many trials. Show independence of events. Discuss law of large numbers. Differentiate dependent vs independent events.",
    },
    Row {
        taxonomy_id: "misc_017",
        tag: "double-negative",
        name: "Double Negative Confusion",
        category: NumberOperations,
        description: "Struggles with subtracting negative numbers or multiplying negatives",
        prerequisite_skills: &["negative numbers", "operations"],
        remediation_strategy: "Use number line models. Temperature/debt contexts. Show that subtracting debt adds. Practice with pattern recognition (-2x1, -2x0, -2x-1...).",
    },
    Row {
        taxonomy_id: "misc_018",
        tag: "additive-reasoning",
        name: "Additive Instead of Multiplicative Reasoning",
        category: NumberOperations,
        description: "Uses addition/subtraction for proportional situations requiring multiplication/division",
        prerequisite_skills: &["multiplication", "ratios"],
        remediation_strategy: "Use ratio tables. Show multiplicative relationships explicitly. Compare situations requiring additive vs multiplicative thinking. Double/half strategies.",
    },
    Row {
        taxonomy_id: "misc_019",
        tag: "distribute-exponents",
        name: "Distributing Exponents Incorrectly",
        category: Algebra,
        description: "Applies exponent to each term in sum: (a+b)^2 = a^2 + b^2",
        prerequisite_skills: &["distributive property", "FOIL"],
        remediation_strategy: "Expand as (a+b)(a+b). Use area models for (a+b)^2. Practice with numerical examples first. Show why it doesn't distribute.",
    },
    Row {
        taxonomy_id: "misc_020",
        tag: "percentage-absolute",
        name: "Percentage as Absolute Value",
        category: Decimals,
        description: "Treats percentages as fixed amounts regardless of base",
        prerequisite_skills: &["fractions", "decimals", "proportions"],
        remediation_strategy: "Show percentage as 'per hundred'. Use benchmark percentages (10%, 50%, 25%). Practice finding percentage of different amounts. Fraction-decimal-percentage connections.",
    },
];

/// Every built-in entry. Intervention ids follow `INT-MISC-nnn`.
pub fn taxonomy() -> Vec<MisconceptionEntry> {
    TAXONOMY
        .iter()
        .map(|row| MisconceptionEntry {
            tag: row.tag.to_string(),
            taxonomy_id: row.taxonomy_id.to_string(),
            name: row.name.to_string(),
            category: row.category,
            description: row.description.to_string(),
            prerequisite_skills: row
                .prerequisite_skills
                .iter()
                .map(|s| s.to_string())
                .collect(),
            remediation_strategy: row.remediation_strategy.to_string(),
            intervention_ids: vec![format!(
                "INT-{}",
                row.taxonomy_id.replace('_', "-").to_uppercase()
            )],
        })
        .collect()
}
