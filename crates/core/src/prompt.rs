use crate::models::ValidTripRequest;

const ITINERARY_INSTRUCTIONS: &str = "\
For Every day suggest 3 activities:
- Morning Activity
- Afternoon Activity
- Evening Activity

For each activity of a day, provide:
  - Title
  - Budget (e.g., \"PKR 3000-5000\")
  - Description

Start every day with a heading line in this format:
Day [N]: [Date] ([Area])

Output should be in this format:
Morning Activity:
  Title: [Title]
  Budget: [Budget]
  Description: [Description]
Afternoon Activity:
  Title: [Title]
  Budget: [Budget]
  Description: [Description]
Evening Activity:
  Title: [Title]
  Budget: [Budget]
  Description: [Description]

IMPORTANT RULES
- DO NOT add empty lines between activities.
- DO NOT skip or group days.
- Provide long, detailed descriptions and include transportation.
- Suggest specific hotels, restaurants, or attractions (with names/addresses).
- If concerts/events are unavailable, suggest alternate entertainment options.
- Ensure activities fit within budget & preferences.
- The Budget provided is in PKR not dollars.
- Stick to the exact destinations provided, do not suggest any other destinations to visit.
- Put any general advice after the last day under a line starting with \"Notes:\".";

pub fn build_itinerary_prompt(request: &ValidTripRequest) -> String {
    let details = serde_json::to_string(request).unwrap_or_else(|_| "{}".to_string());
    format!("Following are Trip Details:\n{details}\n\n{ITINERARY_INSTRUCTIONS}\n")
}
